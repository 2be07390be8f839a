use super::{resize_image_correct_bbox, GroundTruth, TargetAssigner, Targets};
use crate::{anchors::Anchors, common::*, config::Config};

/// A network-ready example.
#[derive(Debug)]
pub struct PreprocessOutput {
    /// The `[height, width, 3]` image with values in `[0, 1]`.
    pub image: Tensor,
    /// Boxes in pixels of the resized image.
    pub boxes: Vec<GroundTruth>,
    pub targets: Targets,
}

/// Resizes images to the network input size and builds their targets.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    image_hw: [usize; 2],
    assigner: TargetAssigner,
}

impl Preprocessor {
    pub fn new(anchors: Anchors, image_hw: [usize; 2], num_classes: usize) -> Result<Self> {
        Ok(Self {
            image_hw,
            assigner: TargetAssigner::new(anchors, image_hw, num_classes)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.anchors()?, config.image_hw(), config.num_classes())
    }

    pub fn assigner(&self) -> &TargetAssigner {
        &self.assigner
    }

    /// Preprocesses a `[height, width, 3]` image with pixel values in `[0, 255]`.
    pub fn preprocess(&self, image: &Tensor, boxes: &[GroundTruth]) -> Result<PreprocessOutput> {
        let (image, boxes) = resize_image_correct_bbox(image, boxes, self.image_hw)?;
        let image = image / 255.0;
        let targets = self.assigner.assign(&boxes)?;
        Ok(PreprocessOutput {
            image,
            boxes,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preprocess_example() -> Result<()> {
        let preprocessor = Preprocessor::new(Anchors::default(), [64, 64], 2)?;
        let image = Tensor::full(&[32, 32, 3], 255i64, (Kind::Uint8, Device::Cpu));
        // a 29x29 box centered at (16, 16) doubles to 58x58 centered at (32, 32)
        let boxes = vec![GroundTruth::from_xyxy([1.5, 1.5, 30.5, 30.5], 1)?];

        let PreprocessOutput {
            image,
            boxes,
            targets,
        } = preprocessor.preprocess(&image, &boxes)?;

        assert_eq!(image.size(), vec![64, 64, 3]);
        assert!((image - 1.0).abs().max().double_value(&[]) < 1e-5);
        assert_eq!(boxes.len(), 1);

        let tensors = targets.to_tensors();
        assert_eq!(tensors[0].size(), vec![2, 2, 3, 7]);
        assert_eq!(tensors[1].size(), vec![4, 4, 3, 7]);
        assert_eq!(tensors[2].size(), vec![8, 8, 3, 7]);
        assert_eq!(targets.assignments.len(), 1);
        Ok(())
    }
}
