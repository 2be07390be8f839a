use crate::common::*;

/// Pairwise IoU between every predicted box and every true box.
///
/// Boxes are `(cx, cy, w, h)`. `true_boxes` has shape `[num_true, 4]` and
/// `pred_boxes` has shape `[.., 4]`. The output has shape `[.., num_true]`.
/// Pairs of zero-area boxes produce NaN.
pub fn broadcast_iou(true_boxes: &Tensor, pred_boxes: &Tensor) -> Result<Tensor> {
    let true_size = true_boxes.size();
    let pred_size = pred_boxes.size();
    ensure!(
        true_size.len() == 2 && true_size[1] == 4,
        "expect [num_true, 4] true boxes, but get {:?}",
        true_size
    );
    ensure!(
        pred_size.last() == Some(&4),
        "expect [.., 4] predicted boxes, but get {:?}",
        pred_size
    );

    // [.., 1, 4] against [num_true, 4]
    let pred_boxes = pred_boxes.unsqueeze(-2);

    let corners = |boxes: &Tensor| {
        let center = boxes.narrow(-1, 0, 2);
        let size = boxes.narrow(-1, 2, 2);
        let half = &size / 2.0;
        (&center - &half, &center + &half, size)
    };
    let (pred_min, pred_max, pred_wh) = corners(&pred_boxes);
    let (true_min, true_max, true_wh) = corners(true_boxes);

    let inter_min = pred_min.f_maximum(&true_min)?;
    let inter_max = pred_max.f_minimum(&true_max)?;
    let inter_wh = (inter_max - inter_min).clamp_min(0.0);

    let area = |wh: &Tensor| wh.select(-1, 0) * wh.select(-1, 1);
    let inter_area = area(&inter_wh);
    let pred_area = area(&pred_wh);
    let true_area = area(&true_wh);

    Ok(&inter_area / (pred_area + true_area - &inter_area))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::prelude::*;

    #[test]
    fn pairwise_iou_shape_and_values() -> Result<()> {
        let true_boxes = Tensor::of_slice(&[5f32, 5.0, 10.0, 10.0, 10.0, 5.0, 10.0, 10.0])
            .view([2, 4]);
        let pred_boxes = Tensor::of_slice(&[5f32, 5.0, 10.0, 10.0]).view([1, 1, 1, 4]);
        let iou = broadcast_iou(&true_boxes, &pred_boxes)?;
        assert_eq!(iou.size(), vec![1, 1, 1, 2]);
        assert_abs_diff_eq!(iou.double_value(&[0, 0, 0, 0]), 1.0, epsilon = 1e-6);
        // intersection 50, union 150
        assert_abs_diff_eq!(iou.double_value(&[0, 0, 0, 1]), 1.0 / 3.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(11);
        // true boxes in the left half, predictions in the right half
        let mut sample = |x_min: f32, x_max: f32| {
            let w = rng.gen_range(1f32..20.0);
            let h = rng.gen_range(1f32..20.0);
            let cx = rng.gen_range((x_min + w / 2.0)..(x_max - w / 2.0));
            let cy = rng.gen_range(20f32..80.0);
            [cx, cy, w, h]
        };
        let true_values: Vec<f32> = (0..8).flat_map(|_| sample(0.0, 50.0)).collect();
        let pred_values: Vec<f32> = (0..24).flat_map(|_| sample(50.0, 100.0)).collect();

        let true_boxes = Tensor::of_slice(&true_values).view([8, 4]);
        let pred_boxes = Tensor::of_slice(&pred_values).view([2, 3, 4, 4]);
        let iou = broadcast_iou(&true_boxes, &pred_boxes)?;
        assert_eq!(iou.size(), vec![2, 3, 4, 8]);
        assert_eq!(iou.abs().max().double_value(&[]), 0.0);
        Ok(())
    }
}
