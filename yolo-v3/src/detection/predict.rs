use super::{reorg, ReorgOutput};
use crate::{
    anchors::{Anchors, NUM_SCALES},
    common::*,
};

/// Detections of every anchor in every cell, merged across scales.
#[derive(Debug, TensorLike)]
pub struct Prediction {
    /// `[batch, num_boxes, 4]` boxes as `(x_min, y_min, x_max, y_max)`.
    pub boxes: Tensor,
    /// `[batch, num_boxes, 1]` objectness scores.
    pub confs: Tensor,
    /// `[batch, num_boxes, num_classes]` class probabilities.
    pub probs: Tensor,
}

/// Decodes the feature maps of all scales, ordered from coarse to fine.
pub fn predict(
    feature_maps: &[Tensor],
    anchors: &Anchors,
    num_classes: usize,
    image_hw: [usize; 2],
) -> Result<Prediction> {
    ensure!(
        feature_maps.len() == NUM_SCALES,
        "expect {} feature maps, but get {}",
        NUM_SCALES,
        feature_maps.len()
    );

    let per_scale: Vec<_> = feature_maps
        .iter()
        .enumerate()
        .map(|(scale, feature_map)| -> Result<_> {
            let ReorgOutput {
                boxes,
                conf_logits,
                prob_logits,
                ..
            } = reorg(
                feature_map,
                &anchors.scale_group(scale),
                num_classes,
                image_hw,
            )?;
            let batch_size = boxes.size()[0];
            Ok((
                boxes.f_reshape(&[batch_size, -1, 4])?,
                conf_logits.f_reshape(&[batch_size, -1, 1])?,
                prob_logits.f_reshape(&[batch_size, -1, num_classes as i64])?,
            ))
        })
        .try_collect()?;
    let (boxes_vec, confs_vec, probs_vec) = per_scale.into_iter().unzip_n_vec();

    let boxes = Tensor::f_cat(&boxes_vec, 1)?;
    let confs = Tensor::f_cat(&confs_vec, 1)?.sigmoid();
    let probs = Tensor::f_cat(&probs_vec, 1)?.sigmoid();

    let center = boxes.i((.., .., 0..2));
    let half_size = boxes.i((.., .., 2..4)) / 2.0;
    let boxes = Tensor::f_cat(&[&center - &half_size, &center + &half_size], -1)?;

    Ok(Prediction {
        boxes,
        confs,
        probs,
    })
}
