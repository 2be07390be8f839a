use crate::{
    anchors::{AnchorLocation, Anchors, ANCHORS_PER_SCALE, NUM_SCALES, SCALE_STRIDES},
    common::*,
};
use bbox::{prelude::*, CyCxHW, HW, TLBR};

/// A labeled box in pixels of the network input.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruth {
    pub rect: TLBR<f64>,
    pub class_id: usize,
}

impl GroundTruth {
    /// Builds a box from `[x_min, y_min, x_max, y_max]` corners.
    pub fn from_xyxy(xyxy: [f64; 4], class_id: usize) -> Result<Self> {
        let rect = TLBR::try_from_xyxy(xyxy)
            .with_context(|| format!("invalid box {:?} with class id {}", xyxy, class_id))?;
        Ok(Self { rect, class_id })
    }

    /// Builds a box from an `[x_min, y_min, x_max, y_max, class_id]` row.
    pub fn from_xyxyc(row: [f64; 5]) -> Result<Self> {
        let [x0, y0, x1, y1, class_id] = row;
        ensure!(
            class_id >= 0.0 && class_id.fract() == 0.0,
            "invalid class id {} in box {:?}",
            class_id,
            row
        );
        Self::from_xyxy([x0, y0, x1, y1], class_id as usize)
    }
}

/// The target array of one detection scale in `[rows, cols, anchors, 5 + num_classes]` layout.
///
/// Each occupied slot holds `(cx, cy, w, h)` in pixels, the objectness 1 and
/// a one-hot class vector.
#[derive(Debug, Clone, PartialEq, CopyGetters)]
pub struct TargetArray {
    #[get_copy = "pub"]
    grid_h: usize,
    #[get_copy = "pub"]
    grid_w: usize,
    #[get_copy = "pub"]
    num_classes: usize,
    data: Vec<f32>,
}

impl TargetArray {
    pub fn zeros(grid_h: usize, grid_w: usize, num_classes: usize) -> Self {
        let len = grid_h * grid_w * ANCHORS_PER_SCALE * (5 + num_classes);
        Self {
            grid_h,
            grid_w,
            num_classes,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        [
            self.grid_h,
            self.grid_w,
            ANCHORS_PER_SCALE,
            5 + self.num_classes,
        ]
    }

    fn slot_range(&self, row: usize, col: usize, slot: usize) -> std::ops::Range<usize> {
        let num_entries = 5 + self.num_classes;
        let begin = ((row * self.grid_w + col) * ANCHORS_PER_SCALE + slot) * num_entries;
        begin..(begin + num_entries)
    }

    /// The entries of a (cell, anchor) slot.
    pub fn slot(&self, row: usize, col: usize, slot: usize) -> &[f32] {
        let range = self.slot_range(row, col, slot);
        &self.data[range]
    }

    pub fn is_occupied(&self, row: usize, col: usize, slot: usize) -> bool {
        self.slot(row, col, slot)[4] != 0.0
    }

    fn write(&mut self, row: usize, col: usize, slot: usize, rect: &CyCxHW<f64>, class_id: usize) {
        let range = self.slot_range(row, col, slot);
        let entries = &mut self.data[range];
        entries.iter_mut().for_each(|value| *value = 0.0);
        let [cx, cy, w, h] = rect.cxcywh();
        entries[0] = cx as f32;
        entries[1] = cy as f32;
        entries[2] = w as f32;
        entries[3] = h as f32;
        entries[4] = 1.0;
        entries[5 + class_id] = 1.0;
    }

    pub fn num_objects(&self) -> usize {
        self.data
            .chunks(5 + self.num_classes)
            .filter(|entries| entries[4] != 0.0)
            .count()
    }

    pub fn to_tensor(&self) -> Tensor {
        let shape: Vec<i64> = self.shape().iter().map(|&size| size as i64).collect();
        Tensor::of_slice(&self.data).reshape(shape.as_slice())
    }
}

/// Where a ground truth box was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// The index of the box in the input list.
    pub box_index: usize,
    pub anchor_index: usize,
    pub scale: usize,
    pub row: usize,
    pub col: usize,
    pub slot: usize,
}

/// The target arrays of all scales for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Targets {
    /// Target arrays ordered from coarse to fine scale.
    pub scales: Vec<TargetArray>,
    /// Surviving assignments in input order.
    pub assignments: Vec<Assignment>,
    pub num_discarded: usize,
    pub num_overwritten: usize,
}

impl Targets {
    /// One `[rows, cols, anchors, 5 + num_classes]` tensor per scale.
    pub fn to_tensors(&self) -> Vec<Tensor> {
        self.scales.iter().map(TargetArray::to_tensor).collect()
    }

    /// Stacks per-image targets into `[batch, rows, cols, anchors, 5 + num_classes]` tensors.
    pub fn batch<T>(targets: &[T]) -> Result<Vec<Tensor>>
    where
        T: Borrow<Targets>,
    {
        ensure!(!targets.is_empty(), "cannot batch an empty list of targets");
        (0..NUM_SCALES)
            .map(|scale| -> Result<_> {
                let tensors: Vec<_> = targets
                    .iter()
                    .map(|targets| -> Result<_> {
                        let array = targets.borrow().scales.get(scale).ok_or_else(|| {
                            format_err!("missing the target array of scale {}", scale)
                        })?;
                        Ok(array.to_tensor())
                    })
                    .try_collect()?;
                Ok(Tensor::f_stack(&tensors, 0)?)
            })
            .try_collect()
    }
}

/// Matches ground truth boxes to anchors and grid cells.
#[derive(Debug, Clone)]
pub struct TargetAssigner {
    anchors: Anchors,
    image_hw: [usize; 2],
    num_classes: usize,
}

impl TargetAssigner {
    pub fn new(anchors: Anchors, image_hw: [usize; 2], num_classes: usize) -> Result<Self> {
        let [image_h, image_w] = image_hw;
        ensure!(num_classes > 0, "num_classes must be positive");
        ensure!(
            image_h > 0 && image_w > 0 && image_h % 32 == 0 && image_w % 32 == 0,
            "image size must be positive multiples of 32, but get {}x{}",
            image_h,
            image_w
        );
        Ok(Self {
            anchors,
            image_hw,
            num_classes,
        })
    }

    /// The `[rows, cols]` grid size of each scale.
    pub fn grid_sizes(&self) -> [[usize; 2]; NUM_SCALES] {
        let [image_h, image_w] = self.image_hw;
        SCALE_STRIDES.map(|stride| [image_h / stride, image_w / stride])
    }

    /// Builds the target arrays of one image.
    ///
    /// Each box goes to the anchor with the highest shape IoU and to the
    /// cell containing its center. A later box replaces an earlier box
    /// assigned to the same slot.
    pub fn assign(&self, boxes: &[GroundTruth]) -> Result<Targets> {
        let [image_h, image_w] = self.image_hw;
        let grid_sizes = self.grid_sizes();
        let mut scales: Vec<_> = grid_sizes
            .iter()
            .map(|&[grid_h, grid_w]| TargetArray::zeros(grid_h, grid_w, self.num_classes))
            .collect();
        let mut assignments: Vec<Assignment> = vec![];
        let mut num_discarded = 0;
        let mut num_overwritten = 0;

        for (box_index, gt) in boxes.iter().enumerate() {
            let GroundTruth { ref rect, class_id } = *gt;
            ensure!(
                class_id < self.num_classes,
                "box {} {:?} has class id {}, but the number of classes is {}",
                box_index,
                rect.xyxy(),
                class_id,
                self.num_classes
            );

            let center_box = CyCxHW::from(rect);
            let [cy, cx, h, w] = center_box.cycxhw();
            if !(w > 0.0 && h > 0.0) {
                debug!(
                    "discard box {} {:?} with empty size {}x{}",
                    box_index,
                    rect.xyxy(),
                    w,
                    h
                );
                num_discarded += 1;
                continue;
            }

            if !((0.0..=image_h as f64).contains(&cy) && (0.0..=image_w as f64).contains(&cx)) {
                warn!(
                    "box {} {:?} is centered outside the {}x{} image and is clamped to the border cell",
                    box_index,
                    rect.xyxy(),
                    image_h,
                    image_w
                );
            }

            let anchor_index = self.anchors.best_match(&HW::try_from_hw([h, w])?);
            let AnchorLocation { scale, slot } = Anchors::locate(anchor_index)
                .ok_or_else(|| format_err!("anchor {} is not owned by any scale", anchor_index))?;
            let [grid_h, grid_w] = grid_sizes[scale];
            let row = cell_index(cy / image_h as f64, grid_h);
            let col = cell_index(cx / image_w as f64, grid_w);

            let array = &mut scales[scale];
            if array.is_occupied(row, col, slot) {
                debug!(
                    "box {} overwrites the target at scale {}, cell ({}, {}), anchor slot {}",
                    box_index, scale, row, col, slot
                );
                assignments.retain(|prev| {
                    !(prev.scale == scale && prev.row == row && prev.col == col && prev.slot == slot)
                });
                num_overwritten += 1;
            }
            array.write(row, col, slot, &center_box, class_id);
            assignments.push(Assignment {
                box_index,
                anchor_index,
                scale,
                row,
                col,
                slot,
            });
        }

        Ok(Targets {
            scales,
            assignments,
            num_discarded,
            num_overwritten,
        })
    }
}

fn cell_index(ratio: f64, grid_size: usize) -> usize {
    let index = (ratio * grid_size as f64).floor().max(0.0) as usize;
    index.min(grid_size - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn assigner() -> TargetAssigner {
        TargetAssigner::new(Anchors::default(), [416, 416], 3).unwrap()
    }

    #[test]
    fn assign_single_box() -> Result<()> {
        let assigner = assigner();
        // 116x90 box centered at (208, 208)
        let gt = GroundTruth::from_xyxyc([150.0, 163.0, 266.0, 253.0, 2.0])?;
        let targets = assigner.assign(&[gt])?;

        assert_eq!(targets.assignments.len(), 1);
        let Assignment {
            anchor_index,
            scale,
            row,
            col,
            slot,
            ..
        } = targets.assignments[0];
        assert_eq!(anchor_index, 6);
        assert_eq!((scale, slot), (0, 0));
        assert_eq!((row, col), (6, 6));

        let entries = targets.scales[0].slot(row, col, slot);
        assert_eq!(entries, &[208.0, 208.0, 116.0, 90.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(targets.scales[0].num_objects(), 1);
        assert_eq!(targets.scales[1].num_objects(), 0);
        assert_eq!(targets.scales[2].num_objects(), 0);

        let tensors = targets.to_tensors();
        assert_eq!(tensors[0].size(), vec![13, 13, 3, 8]);
        assert_eq!(tensors[1].size(), vec![26, 26, 3, 8]);
        assert_eq!(tensors[2].size(), vec![52, 52, 3, 8]);
        assert_eq!(tensors[0].double_value(&[6, 6, 0, 4]), 1.0);
        Ok(())
    }

    #[test]
    fn slot_holds_center_and_size() -> Result<()> {
        let assigner = assigner();
        let gt = GroundTruth::from_xyxy([8.0, 4.5, 18.0, 17.5], 1)?;
        let targets = assigner.assign(&[gt.clone()])?;

        let Assignment {
            anchor_index,
            scale,
            row,
            col,
            slot,
            ..
        } = targets.assignments[0];
        assert_eq!(anchor_index, 0);
        assert_eq!((scale, row, col, slot), (2, 1, 1, 0));

        let entries = targets.scales[scale].slot(row, col, slot);
        let expect = CyCxHW::from(&gt.rect).cxcywh().map(|value| value as f32);
        assert_eq!(&entries[..4], &expect);
        assert_eq!(&entries[..4], &[13.0, 11.0, 10.0, 13.0]);
        Ok(())
    }

    #[test]
    fn later_box_overwrites_slot() -> Result<()> {
        let assigner = assigner();
        let first = GroundTruth::from_xyxyc([100.0, 100.0, 110.0, 113.0, 0.0])?;
        let second = GroundTruth::from_xyxyc([101.0, 101.0, 111.0, 114.0, 1.0])?;
        let targets = assigner.assign(&[first, second])?;

        assert_eq!(targets.num_overwritten, 1);
        assert_eq!(targets.assignments.len(), 1);
        let Assignment {
            box_index,
            scale,
            row,
            col,
            slot,
            ..
        } = targets.assignments[0];
        assert_eq!(box_index, 1);
        assert_eq!(scale, 2);

        let entries = targets.scales[scale].slot(row, col, slot);
        assert_eq!(&entries[4..], &[1.0, 0.0, 1.0, 0.0]);
        assert_eq!(entries[0], 106.0);
        Ok(())
    }

    #[test]
    fn discard_empty_boxes() -> Result<()> {
        let assigner = assigner();
        let flat = GroundTruth::from_xyxyc([10.0, 10.0, 50.0, 10.0, 0.0])?;
        let thin = GroundTruth::from_xyxyc([10.0, 10.0, 10.0, 50.0, 0.0])?;
        let targets = assigner.assign(&[flat, thin])?;
        assert_eq!(targets.num_discarded, 2);
        assert!(targets.assignments.is_empty());
        assert!(targets.scales.iter().all(|array| array.num_objects() == 0));
        Ok(())
    }

    #[test]
    fn center_on_border_lands_in_last_cell() -> Result<()> {
        let assigner = assigner();
        let gt = GroundTruth::from_xyxyc([406.0, 403.0, 426.0, 429.0, 0.0])?;
        let targets = assigner.assign(&[gt])?;
        let Assignment { scale, row, col, .. } = targets.assignments[0];
        let [grid_h, grid_w] = assigner.grid_sizes()[scale];
        assert_eq!((row, col), (grid_h - 1, grid_w - 1));
        Ok(())
    }

    #[test]
    fn reject_invalid_boxes() -> Result<()> {
        let assigner = assigner();
        let gt = GroundTruth::from_xyxyc([10.0, 10.0, 20.0, 20.0, 3.0])?;
        let err = assigner.assign(&[gt]).unwrap_err();
        assert!(err.to_string().contains("class id 3"));

        assert!(GroundTruth::from_xyxyc([20.0, 10.0, 10.0, 20.0, 0.0]).is_err());
        assert!(GroundTruth::from_xyxyc([10.0, 10.0, 20.0, 20.0, -1.0]).is_err());
        Ok(())
    }

    #[test]
    fn assignment_is_deterministic() -> Result<()> {
        let assigner = assigner();
        let mut rng = StdRng::seed_from_u64(3);
        let boxes: Vec<_> = (0..50)
            .map(|_| {
                let x0 = rng.gen_range(0.0..380.0);
                let y0 = rng.gen_range(0.0..380.0);
                let w = rng.gen_range(1.0..(416.0 - x0));
                let h = rng.gen_range(1.0..(416.0 - y0));
                let class_id = rng.gen_range(0..3) as f64;
                GroundTruth::from_xyxyc([x0, y0, x0 + w, y0 + h, class_id])
            })
            .try_collect()?;

        let lhs = assigner.assign(&boxes)?;
        let rhs = assigner.assign(&boxes)?;
        assert_eq!(lhs, rhs);

        let num_objects: usize = lhs.scales.iter().map(TargetArray::num_objects).sum();
        assert_eq!(num_objects, lhs.assignments.len());
        assert_eq!(num_objects + lhs.num_overwritten, boxes.len());
        Ok(())
    }

    #[test]
    fn batch_targets() -> Result<()> {
        let assigner = assigner();
        let gt = GroundTruth::from_xyxyc([150.0, 163.0, 266.0, 253.0, 0.0])?;
        let targets = vec![assigner.assign(&[gt])?, assigner.assign(&[])?];
        let tensors = Targets::batch(&targets)?;
        assert_eq!(tensors.len(), 3);
        assert_eq!(tensors[0].size(), vec![2, 13, 13, 3, 8]);
        assert_eq!(tensors[0].double_value(&[0, 6, 6, 0, 4]), 1.0);
        assert_eq!(tensors[0].double_value(&[1, 6, 6, 0, 4]), 0.0);
        Ok(())
    }
}
