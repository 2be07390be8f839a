use super::GroundTruth;
use crate::common::*;
use bbox::{Transform, HW};

/// Resizes a `[height, width, 3]` image to `new_hw` with bilinear
/// interpolation, and rescales the boxes to match.
///
/// Pixel values keep their range. The returned image has float kind.
pub fn resize_image_correct_bbox(
    image: &Tensor,
    boxes: &[GroundTruth],
    new_hw: [usize; 2],
) -> Result<(Tensor, Vec<GroundTruth>)> {
    let (orig_h, orig_w, channels) = image.size3()?;
    ensure!(channels == 3, "expect an RGB image, but get {} channels", channels);
    let [new_h, new_w] = new_hw;
    ensure!(new_h > 0 && new_w > 0, "the target size must be positive");

    let resized = tch::no_grad(|| -> Result<_> {
        let resized = image
            .to_kind(Kind::Float)
            .f_permute(&[2, 0, 1])?
            .unsqueeze(0)
            .f_upsample_bilinear2d(&[new_h as i64, new_w as i64], false, None, None)?
            .select(0, 0)
            .f_permute(&[1, 2, 0])?;
        Ok(resized)
    })?;

    let transform = Transform::from_sizes_exact(
        &HW::try_from_hw([orig_h as f64, orig_w as f64])?,
        &HW::try_from_hw([new_h as f64, new_w as f64])?,
    );
    let boxes = boxes
        .iter()
        .map(|gt| GroundTruth {
            rect: gt.rect.transform(&transform),
            class_id: gt.class_id,
        })
        .collect();

    Ok((resized, boxes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbox::prelude::*;

    #[test]
    fn resize_stretches_image_and_boxes() -> Result<()> {
        let image = Tensor::full(&[4, 2, 3], 100i64, (Kind::Uint8, Device::Cpu));
        let boxes = vec![GroundTruth::from_xyxy([0.0, 1.0, 2.0, 3.0], 1)?];

        let (resized, boxes) = resize_image_correct_bbox(&image, &boxes, [8, 8])?;
        assert_eq!(resized.size(), vec![8, 8, 3]);
        assert_eq!(resized.kind(), Kind::Float);
        assert!((resized - 100.0).abs().max().double_value(&[]) < 1e-4);

        assert_eq!(boxes[0].rect.xyxy(), [0.0, 2.0, 8.0, 6.0]);
        assert_eq!(boxes[0].class_id, 1);
        Ok(())
    }

    #[test]
    fn reject_non_rgb_image() {
        let image = Tensor::zeros(&[4, 4, 1], (Kind::Float, Device::Cpu));
        assert!(resize_image_correct_bbox(&image, &[], [8, 8]).is_err());
    }
}
