//! Defines loss for training.

use super::{
    bce_with_logit_loss::{BceWithLogitsLoss, BceWithLogitsLossInit},
    broadcast_iou,
    l2_loss::L2Loss,
};
use crate::{
    anchors::{Anchors, NUM_SCALES},
    common::*,
    config::Config,
    detection::{encode, reorg, EncodedBoxes, ReorgOutput},
    model::YoloV3Output,
};

pub use yolo_loss::*;
pub use yolo_loss_output::*;

mod yolo_loss {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct YoloLossInit {
        pub num_classes: usize,
        pub anchors: Anchors,
        /// The network input size in `[height, width]`.
        pub image_hw: [usize; 2],
        pub ignore_thresh: f64,
    }

    impl YoloLossInit {
        pub fn from_config(config: &Config) -> Result<Self> {
            Ok(Self {
                num_classes: config.num_classes(),
                anchors: config.anchors()?,
                image_hw: config.image_hw(),
                ignore_thresh: config.model.loss.ignore_thresh.raw(),
            })
        }

        pub fn build(self) -> Result<YoloLoss> {
            let Self {
                num_classes,
                anchors,
                image_hw,
                ignore_thresh,
            } = self;
            let [image_h, image_w] = image_hw;

            ensure!(num_classes > 0, "num_classes must be positive");
            ensure!(
                image_h > 0 && image_w > 0,
                "image size must be positive, but get {}x{}",
                image_h,
                image_w
            );
            ensure!(
                (0.0..=1.0).contains(&ignore_thresh),
                "ignore_thresh must be in range [0, 1]"
            );

            Ok(YoloLoss {
                num_classes,
                anchors,
                image_hw,
                ignore_thresh,
                bce: BceWithLogitsLossInit::default(Reduction::Sum).build(),
                l2: L2Loss::new(Reduction::Sum),
            })
        }
    }

    #[derive(Debug)]
    pub struct YoloLoss {
        num_classes: usize,
        anchors: Anchors,
        image_hw: [usize; 2],
        ignore_thresh: f64,
        bce: BceWithLogitsLoss,
        l2: L2Loss,
    }

    impl YoloLoss {
        /// Computes the loss of a forward pass that carries its ground truth.
        pub fn forward(&self, output: &YoloV3Output) -> Result<YoloLossOutput> {
            let YoloV3Output {
                feature_maps,
                y_true,
            } = output;
            let y_true = y_true
                .as_ref()
                .ok_or_else(|| format_err!("the model output does not carry ground truth"))?;
            self.forward_with_targets(feature_maps, y_true)
        }

        /// Computes the loss summed over all scales.
        ///
        /// `y_true` holds one `[batch, rows, cols, anchors, 5 + num_classes]`
        /// tensor per scale in the order of the feature maps.
        pub fn forward_with_targets(
            &self,
            feature_maps: &[Tensor],
            y_true: &[Tensor],
        ) -> Result<YoloLossOutput> {
            ensure!(
                feature_maps.len() == NUM_SCALES && y_true.len() == NUM_SCALES,
                "expect {} feature maps and targets, but get {} and {}",
                NUM_SCALES,
                feature_maps.len(),
                y_true.len()
            );

            let losses: Vec<_> = izip!(feature_maps, y_true)
                .enumerate()
                .map(|(scale, (feature_map, y_true))| {
                    self.loss_layer(scale, feature_map, y_true)
                })
                .try_collect()?;
            let loss = YoloLossOutput::sum(losses)?;

            debug_assert!(!bool::from(loss.total_loss.isnan().any()), "NaN detected");
            Ok(loss)
        }

        fn loss_layer(
            &self,
            scale: usize,
            feature_map: &Tensor,
            y_true: &Tensor,
        ) -> Result<YoloLossOutput> {
            let [image_h, image_w] = self.image_hw;
            let anchors = self.anchors.scale_group(scale);
            let y_true = match y_true.dim() {
                4 => y_true.unsqueeze(0),
                _ => y_true.shallow_clone(),
            }
            .to_kind(Kind::Float);
            let (batch_size, grid_h, grid_w, _channels) = feature_map.size4()?;
            let (target_batch_size, target_h, target_w, num_anchors, num_entries) =
                y_true.size5()?;
            ensure!(
                (target_batch_size, target_h, target_w, num_anchors as usize, num_entries as usize)
                    == (batch_size, grid_h, grid_w, anchors.len(), 5 + self.num_classes),
                "the target shape {:?} does not match the feature map shape {:?} at scale {}",
                y_true.size(),
                feature_map.size(),
                scale
            );

            let ReorgOutput {
                xy_offset,
                boxes: pred_boxes,
                conf_logits,
                prob_logits,
            } = reorg(feature_map, &anchors, self.num_classes, self.image_hw)?;

            let true_boxes = y_true.i((.., .., .., .., 0..4));
            let object_mask = y_true.i((.., .., .., .., 4..5));
            let true_probs = y_true.i((.., .., .., .., 5..));

            // predictions overlapping any ground truth above the threshold
            // are not penalized as negatives
            let ignore_mask = tch::no_grad(|| -> Result<_> {
                let masks: Vec<_> = (0..batch_size)
                    .map(|index| -> Result<_> {
                        let valid_boxes = true_boxes
                            .select(0, index)
                            .f_masked_select(&object_mask.select(0, index).gt(0.5))?
                            .f_view([-1, 4])?;
                        let pred_boxes = pred_boxes.select(0, index).detach();

                        let best_iou = if valid_boxes.size()[0] == 0 {
                            Tensor::zeros(
                                &[grid_h, grid_w, num_anchors],
                                (Kind::Float, feature_map.device()),
                            )
                        } else {
                            broadcast_iou(&valid_boxes, &pred_boxes)?.amax(&[-1], false)
                        };
                        Ok(best_iou.lt(self.ignore_thresh).to_kind(Kind::Float))
                    })
                    .try_collect()?;
                Ok(Tensor::f_stack(&masks, 0)?.unsqueeze(-1))
            })?;

            let EncodedBoxes {
                xy: true_xy,
                log_wh: true_log_wh,
            } = encode(&true_boxes, &xy_offset, &anchors, self.image_hw)?;
            let EncodedBoxes {
                xy: pred_xy,
                log_wh: pred_log_wh,
            } = encode(&pred_boxes, &xy_offset, &anchors, self.image_hw)?;

            // smaller boxes get larger weights
            let box_loss_scale = {
                let area_ratio = true_boxes.i((.., .., .., .., 2..3)) / image_w as f64
                    * true_boxes.i((.., .., .., .., 3..4))
                    / image_h as f64;
                area_ratio.neg() + 2.0
            };
            let box_weight = &object_mask * &box_loss_scale;
            let batch_size = batch_size as f64;

            let xy_loss = self.l2.forward(&pred_xy, &true_xy, Some(&box_weight)) / batch_size;
            let wh_loss =
                self.l2.forward(&pred_log_wh, &true_log_wh, Some(&box_weight)) / batch_size;

            let conf_loss = {
                let pos_mask = &object_mask;
                let neg_mask = (object_mask.neg() + 1.0) * &ignore_mask;
                let conf_mask = pos_mask + neg_mask;
                self.bce
                    .forward(&conf_logits, &object_mask, Some(&conf_mask))
                    / batch_size
            };

            let class_loss = self
                .bce
                .forward(&prob_logits, &true_probs, Some(&object_mask))
                / batch_size;

            let total_loss = &xy_loss + &wh_loss + &conf_loss + &class_loss;

            Ok(YoloLossOutput {
                total_loss,
                xy_loss,
                wh_loss,
                conf_loss,
                class_loss,
            })
        }
    }
}

mod yolo_loss_output {
    use super::*;

    #[derive(Debug, TensorLike)]
    pub struct YoloLossOutput {
        pub total_loss: Tensor,
        pub xy_loss: Tensor,
        pub wh_loss: Tensor,
        pub conf_loss: Tensor,
        pub class_loss: Tensor,
    }

    impl YoloLossOutput {
        /// Adds up the terms of per-scale losses.
        pub fn sum<L>(iter: impl IntoIterator<Item = L>) -> Result<Self>
        where
            L: Borrow<YoloLossOutput>,
        {
            let (total_loss_vec, xy_loss_vec, wh_loss_vec, conf_loss_vec, class_loss_vec) = iter
                .into_iter()
                .map(|loss| {
                    let YoloLossOutput {
                        total_loss,
                        xy_loss,
                        wh_loss,
                        conf_loss,
                        class_loss,
                    } = loss.borrow().shallow_clone();
                    (total_loss, xy_loss, wh_loss, conf_loss, class_loss)
                })
                .unzip_n_vec();
            ensure!(!total_loss_vec.is_empty(), "cannot sum an empty list of losses");

            let sum = |tensors: Vec<Tensor>| -> Result<Tensor> {
                Ok(Tensor::f_stack(&tensors, 0)?.sum(Kind::Float))
            };

            Ok(YoloLossOutput {
                total_loss: sum(total_loss_vec)?,
                xy_loss: sum(xy_loss_vec)?,
                wh_loss: sum(wh_loss_vec)?,
                conf_loss: sum(conf_loss_vec)?,
                class_loss: sum(class_loss_vec)?,
            })
        }
    }
}
