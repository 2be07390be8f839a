use super::{
    BatchNormInit, Concat2D, ConvBn2D, ConvOptions, Darknet53, Darknet53Init, Darknet53Output,
    DetectionLayer, DetectionLayerInit, UpSample2D, YoloBlock, YoloBlockInit,
};
use crate::{
    anchors::{Anchors, ANCHORS_PER_SCALE, NUM_SCALES, SCALE_STRIDES},
    common::*,
    config::Config,
    detection::{self, Prediction},
};
use tch_act::Activation;

#[derive(Debug, Clone)]
pub struct YoloV3Init {
    pub num_classes: usize,
    /// The network input size in `[height, width]`.
    pub image_hw: [usize; 2],
    pub anchors: Anchors,
    pub leaky_relu: f64,
    pub batch_norm_decay: f64,
}

impl YoloV3Init {
    pub fn from_config(config: &Config) -> Result<Self> {
        let network = &config.model.network;
        Ok(Self {
            num_classes: config.num_classes(),
            image_hw: config.image_hw(),
            anchors: config.anchors()?,
            leaky_relu: network.leaky_relu.raw(),
            batch_norm_decay: network.batch_norm_decay.raw(),
        })
    }

    pub fn build<'p, P>(self, path: P) -> Result<YoloV3>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            num_classes,
            image_hw,
            anchors,
            leaky_relu,
            batch_norm_decay,
        } = self;
        let [image_h, image_w] = image_hw;

        ensure!(num_classes > 0, "num_classes must be positive");
        ensure!(
            image_h > 0 && image_w > 0 && image_h % 32 == 0 && image_w % 32 == 0,
            "image size must be positive multiples of 32, but get {}x{}",
            image_h,
            image_w
        );
        ensure!(leaky_relu >= 0.0, "leaky_relu must be non-negative");

        let options = ConvOptions {
            activation: Activation::leaky_relu(leaky_relu),
            batch_norm: BatchNormInit::from_decay(batch_norm_decay)?,
        };

        let backbone = Darknet53Init {
            in_c: 3,
            options: options.clone(),
        }
        .build(path / "darknet53");

        let detection_layer = |in_c: usize, name: &str| {
            DetectionLayerInit {
                in_c,
                num_anchors: ANCHORS_PER_SCALE,
                num_classes,
            }
            .build(path / name)
        };

        let block_1 = YoloBlockInit {
            in_c: 1024,
            filters: 512,
            options: options.clone(),
        }
        .build(path / "yolo_block_1");
        let detect_1 = detection_layer(1024, "detect_1");
        let route_conv_1 = options.conv(512, 256, 1).build(path / "route_conv_1");

        let block_2 = YoloBlockInit {
            in_c: 256 + 512,
            filters: 256,
            options: options.clone(),
        }
        .build(path / "yolo_block_2");
        let detect_2 = detection_layer(512, "detect_2");
        let route_conv_2 = options.conv(256, 128, 1).build(path / "route_conv_2");

        let block_3 = YoloBlockInit {
            in_c: 128 + 256,
            filters: 128,
            options,
        }
        .build(path / "yolo_block_3");
        let detect_3 = detection_layer(256, "detect_3");

        info!(
            "built YOLO-v3 with {} backbone layers, {} classes and {}x{} input",
            backbone.num_layers(),
            num_classes,
            image_h,
            image_w
        );
        SCALE_STRIDES.iter().enumerate().for_each(|(scale, stride)| {
            info!(
                "  - scale {}\t{}x{} grid\tanchors {:?}",
                scale,
                image_h / stride,
                image_w / stride,
                anchors
                    .scale_group(scale)
                    .iter()
                    .map(|anchor| (anchor.w(), anchor.h()))
                    .collect::<Vec<_>>()
            );
        });

        Ok(YoloV3 {
            backbone,
            block_1,
            detect_1,
            route_conv_1,
            block_2,
            detect_2,
            route_conv_2,
            block_3,
            detect_3,
            up_sample: UpSample2D,
            concat: Concat2D,
            num_classes,
            image_hw,
            anchors,
        })
    }
}

/// The YOLO-v3 detector with three detection scales.
#[derive(Debug, Getters, CopyGetters)]
pub struct YoloV3 {
    backbone: Darknet53,
    block_1: YoloBlock,
    detect_1: DetectionLayer,
    route_conv_1: ConvBn2D,
    block_2: YoloBlock,
    detect_2: DetectionLayer,
    route_conv_2: ConvBn2D,
    block_3: YoloBlock,
    detect_3: DetectionLayer,
    up_sample: UpSample2D,
    concat: Concat2D,
    #[get_copy = "pub"]
    num_classes: usize,
    #[get_copy = "pub"]
    image_hw: [usize; 2],
    #[get = "pub"]
    anchors: Anchors,
}

/// Raw feature maps and the forwarded ground truth.
#[derive(Debug)]
pub struct YoloV3Output {
    /// `[batch, rows, cols, 3 * (5 + num_classes)]` maps at strides 32, 16 and 8.
    pub feature_maps: Vec<Tensor>,
    /// Float target tensors in the same scale order, if provided.
    pub y_true: Option<Vec<Tensor>>,
}

impl YoloV3 {
    /// Runs the network on `[batch, height, width, 3]` or `[height, width, 3]`
    /// RGB images with values in `[0, 1]`.
    pub fn forward_t(
        &self,
        input: &Tensor,
        y_true: Option<&[Tensor]>,
        train: bool,
    ) -> Result<YoloV3Output> {
        let [image_h, image_w] = self.image_hw;

        let input = match input.dim() {
            3 => input.unsqueeze(0),
            4 => input.shallow_clone(),
            dim => bail!("expect a 3 or 4 dimensional input, but get {} dims", dim),
        };
        let (_batch_size, in_h, in_w, in_c) = input.size4()?;
        ensure!(
            in_h == image_h as i64 && in_w == image_w as i64 && in_c == 3,
            "expect [_, {}, {}, 3] input, but get {:?}",
            image_h,
            image_w,
            input.size()
        );
        let xs = input.to_kind(Kind::Float).f_permute(&[0, 3, 1, 2])?;

        let Darknet53Output {
            route_1,
            route_2,
            output,
        } = self.backbone.forward_t(&xs, train)?;

        let (route, xs) = self.block_1.forward_t(&output, train)?;
        let feature_map_1 = self.detect_1.forward_t(&xs, train)?;

        let xs = self.route_conv_1.forward_t(&route, train)?;
        let xs = self.up_sample.forward_like(&xs, &route_2)?;
        let xs = self.concat.forward(&[xs, route_2])?;
        let (route, xs) = self.block_2.forward_t(&xs, train)?;
        let feature_map_2 = self.detect_2.forward_t(&xs, train)?;

        let xs = self.route_conv_2.forward_t(&route, train)?;
        let xs = self.up_sample.forward_like(&xs, &route_1)?;
        let xs = self.concat.forward(&[xs, route_1])?;
        let (_route, xs) = self.block_3.forward_t(&xs, train)?;
        let feature_map_3 = self.detect_3.forward_t(&xs, train)?;

        let y_true = y_true
            .map(|y_true| -> Result<_> {
                ensure!(
                    y_true.len() == NUM_SCALES,
                    "expect {} target tensors, but get {}",
                    NUM_SCALES,
                    y_true.len()
                );
                Ok(y_true
                    .iter()
                    .map(|tensor| tensor.to_kind(Kind::Float))
                    .collect())
            })
            .transpose()?;

        Ok(YoloV3Output {
            feature_maps: vec![feature_map_1, feature_map_2, feature_map_3],
            y_true,
        })
    }

    /// Decodes the feature maps into corner boxes with sigmoid scores.
    pub fn predict(&self, feature_maps: &[Tensor]) -> Result<Prediction> {
        detection::predict(feature_maps, &self.anchors, self.num_classes, self.image_hw)
    }
}
