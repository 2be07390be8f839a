use crate::{anchors::Anchor, common::*};

/// A feature map decoded into absolute boxes.
#[derive(Debug, TensorLike)]
pub struct ReorgOutput {
    /// `[rows, cols, 1, 2]` cell offsets in `(x, y)` order.
    pub xy_offset: Tensor,
    /// `[batch, rows, cols, anchors, 4]` boxes as `(cx, cy, w, h)` in pixels.
    pub boxes: Tensor,
    /// `[batch, rows, cols, anchors, 1]` objectness logits.
    pub conf_logits: Tensor,
    /// `[batch, rows, cols, anchors, num_classes]` class logits.
    pub prob_logits: Tensor,
}

/// Box coordinates in the space the network regresses.
#[derive(Debug, TensorLike)]
pub struct EncodedBoxes {
    /// Center offsets within the owning cell, in `[0, 1]` for inside boxes.
    pub xy: Tensor,
    /// Log of the size relative to the anchor.
    pub log_wh: Tensor,
}

/// The `(x, y)` pixel stride of a grid over the image.
///
/// The grid size is assumed to divide the image size.
pub fn grid_stride(image_hw: [usize; 2], grid_hw: [i64; 2]) -> [f64; 2] {
    let [image_h, image_w] = image_hw;
    let [grid_h, grid_w] = grid_hw;
    [
        (image_w as i64 / grid_w) as f64,
        (image_h as i64 / grid_h) as f64,
    ]
}

/// Creates the `[rows, cols, 1, 2]` tensor of `(col, row)` cell offsets.
pub fn grid_offsets(grid_h: i64, grid_w: i64, device: Device) -> Tensor {
    tch::no_grad(|| {
        let x_offset = Tensor::arange(grid_w, (Kind::Float, device))
            .view([1, grid_w])
            .expand(&[grid_h, grid_w], false);
        let y_offset = Tensor::arange(grid_h, (Kind::Float, device))
            .view([grid_h, 1])
            .expand(&[grid_h, grid_w], false);
        Tensor::stack(&[x_offset, y_offset], -1).view([grid_h, grid_w, 1, 2])
    })
}

fn anchors_tensor(anchors: &[Anchor], device: Device) -> Tensor {
    let values: Vec<f32> = anchors
        .iter()
        .flat_map(|anchor| [anchor.w() as f32, anchor.h() as f32])
        .collect();
    Tensor::of_slice(&values)
        .view([anchors.len() as i64, 2])
        .set_requires_grad(false)
        .to_device(device)
}

fn stride_tensor(stride: [f64; 2], device: Device) -> Tensor {
    let [stride_x, stride_y] = stride;
    Tensor::of_slice(&[stride_x as f32, stride_y as f32])
        .set_requires_grad(false)
        .to_device(device)
}

/// Decodes a `[batch, rows, cols, anchors * (5 + num_classes)]` feature map.
///
/// Centers are `(sigmoid(t) + offset) * stride` and sizes are
/// `exp(t) * anchor`.
pub fn reorg(
    feature_map: &Tensor,
    anchors: &[Anchor],
    num_classes: usize,
    image_hw: [usize; 2],
) -> Result<ReorgOutput> {
    let (_batch_size, grid_h, grid_w, channels) = feature_map.size4()?;
    let device = feature_map.device();
    let num_anchors = anchors.len() as i64;
    let num_entries = num_classes as i64 + 5;
    ensure!(
        channels == num_anchors * num_entries,
        "expect {} channels for {} anchors and {} classes, but get {}",
        num_anchors * num_entries,
        num_anchors,
        num_classes,
        channels
    );

    let stride = stride_tensor(grid_stride(image_hw, [grid_h, grid_w]), device);
    let outputs = feature_map.f_reshape(&[-1, grid_h, grid_w, num_anchors, num_entries])?;

    let box_centers = outputs.i((.., .., .., .., 0..2)).sigmoid();
    let box_sizes = outputs.i((.., .., .., .., 2..4));
    let conf_logits = outputs.i((.., .., .., .., 4..5));
    let prob_logits = outputs.i((.., .., .., .., 5..));

    let xy_offset = grid_offsets(grid_h, grid_w, device);
    let box_centers = (box_centers + &xy_offset) * &stride;
    let box_sizes = box_sizes.exp() * anchors_tensor(anchors, device);
    let boxes = Tensor::f_cat(&[box_centers, box_sizes], -1)?;

    Ok(ReorgOutput {
        xy_offset,
        boxes,
        conf_logits,
        prob_logits,
    })
}

/// Maps absolute `(cx, cy, w, h)` boxes back to regression space.
///
/// Zero size ratios are treated as 1 and ratios are clipped to
/// `[1e-9, 1e9]` before taking the log.
pub fn encode(
    boxes: &Tensor,
    xy_offset: &Tensor,
    anchors: &[Anchor],
    image_hw: [usize; 2],
) -> Result<EncodedBoxes> {
    let size = boxes.size();
    ensure!(
        size.len() == 5 && size[4] == 4,
        "expect [batch, rows, cols, anchors, 4] boxes, but get {:?}",
        size
    );
    let (grid_h, grid_w) = (size[1], size[2]);
    let device = boxes.device();
    let stride = stride_tensor(grid_stride(image_hw, [grid_h, grid_w]), device);

    let xy = boxes.i((.., .., .., .., 0..2)) / &stride - xy_offset;

    let ratio = boxes.i((.., .., .., .., 2..4)) / anchors_tensor(anchors, device);
    let ratio = &ratio + ratio.eq(0.0).to_kind(Kind::Float);
    let log_wh = ratio.clamp(1e-9, 1e9).log();

    Ok(EncodedBoxes { xy, log_wh })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::Anchors;
    use approx::assert_abs_diff_eq;

    #[test]
    fn decode_known_cell() -> Result<()> {
        let anchors = Anchors::default().scale_group(0);
        let num_classes = 2;
        let feature_map = Tensor::zeros(&[1, 2, 2, 3 * 7], (Kind::Float, Device::Cpu));

        // anchor slot 1 in cell (row 1, col 0): tx = ty = 0, tw = ln 2, th = 0
        let _ = feature_map
            .i((0, 1, 0, 7 + 2))
            .fill_(2f64.ln());

        let ReorgOutput {
            xy_offset, boxes, ..
        } = reorg(&feature_map, &anchors, num_classes, [64, 64])?;

        assert_eq!(xy_offset.size(), vec![2, 2, 1, 2]);
        assert_eq!(xy_offset.double_value(&[1, 0, 0, 0]), 0.0);
        assert_eq!(xy_offset.double_value(&[1, 0, 0, 1]), 1.0);
        assert_eq!(boxes.size(), vec![1, 2, 2, 3, 4]);

        // stride 32, sigmoid(0) = 0.5
        assert_abs_diff_eq!(boxes.double_value(&[0, 1, 0, 1, 0]), 16.0, epsilon = 1e-4);
        assert_abs_diff_eq!(boxes.double_value(&[0, 1, 0, 1, 1]), 48.0, epsilon = 1e-4);
        assert_abs_diff_eq!(
            boxes.double_value(&[0, 1, 0, 1, 2]),
            2.0 * anchors[1].w(),
            epsilon = 1e-3
        );
        assert_abs_diff_eq!(
            boxes.double_value(&[0, 1, 0, 1, 3]),
            anchors[1].h(),
            epsilon = 1e-3
        );
        Ok(())
    }

    #[test]
    fn decode_then_encode_recovers_raw_outputs() -> Result<()> {
        let anchors = Anchors::default().scale_group(1);
        let num_classes = 3;
        let feature_map = Tensor::randn(&[2, 4, 4, 3 * 8], (Kind::Float, Device::Cpu));

        let ReorgOutput {
            xy_offset, boxes, ..
        } = reorg(&feature_map, &anchors, num_classes, [64, 64])?;
        let EncodedBoxes { xy, log_wh } = encode(&boxes, &xy_offset, &anchors, [64, 64])?;

        let raw = feature_map.view([2, 4, 4, 3, 8]);
        let expect_xy = raw.i((.., .., .., .., 0..2)).sigmoid();
        let expect_wh = raw.i((.., .., .., .., 2..4));

        let xy_err = (xy - expect_xy).abs().max().double_value(&[]);
        let wh_err = (log_wh - expect_wh).abs().max().double_value(&[]);
        assert!(xy_err < 1e-4, "center error {}", xy_err);
        assert!(wh_err < 1e-4, "size error {}", wh_err);
        Ok(())
    }

    #[test]
    fn reject_channel_mismatch() {
        let anchors = Anchors::default().scale_group(0);
        let feature_map = Tensor::zeros(&[1, 2, 2, 20], (Kind::Float, Device::Cpu));
        assert!(reorg(&feature_map, &anchors, 2, [64, 64]).is_err());
    }
}
