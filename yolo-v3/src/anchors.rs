//! Anchor boxes and their partition over detection scales.

use crate::common::*;
use bbox::HW;

/// The number of detection scales.
pub const NUM_SCALES: usize = 3;

/// The number of anchors owned by each detection scale.
pub const ANCHORS_PER_SCALE: usize = 3;

/// The feature map stride of each detection scale, from coarse to fine.
pub const SCALE_STRIDES: [usize; NUM_SCALES] = [32, 16, 8];

/// Anchor indexes owned by each detection scale, from coarse to fine.
pub const SCALE_ANCHOR_MASKS: [[usize; ANCHORS_PER_SCALE]; NUM_SCALES] =
    [[6, 7, 8], [3, 4, 5], [0, 1, 2]];

/// The default YOLO-v3 anchors in `[width, height]` pixels.
pub const DEFAULT_ANCHORS: [[f64; 2]; NUM_SCALES * ANCHORS_PER_SCALE] = [
    [10.0, 13.0],
    [16.0, 30.0],
    [33.0, 23.0],
    [30.0, 61.0],
    [62.0, 45.0],
    [59.0, 119.0],
    [116.0, 90.0],
    [156.0, 198.0],
    [373.0, 326.0],
];

/// A reference box size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters)]
pub struct Anchor {
    #[get_copy = "pub"]
    w: f64,
    #[get_copy = "pub"]
    h: f64,
}

impl Anchor {
    pub fn new(w: f64, h: f64) -> Result<Self> {
        ensure!(
            w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0,
            "anchor size must be positive, but get {}x{}",
            w,
            h
        );
        Ok(Self { w, h })
    }

    pub fn to_hw(&self) -> HW<f64> {
        HW::from_hw([self.h, self.w])
    }
}

/// The full set of anchors, indexed from the smallest to the largest.
#[derive(Debug, Clone, PartialEq)]
pub struct Anchors {
    anchors: Vec<Anchor>,
}

/// The position of an anchor among the detection scales.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorLocation {
    pub scale: usize,
    pub slot: usize,
}

impl Anchors {
    pub fn new(anchors: Vec<Anchor>) -> Result<Self> {
        ensure!(
            anchors.len() == NUM_SCALES * ANCHORS_PER_SCALE,
            "expect {} anchors, but get {}",
            NUM_SCALES * ANCHORS_PER_SCALE,
            anchors.len()
        );
        Ok(Self { anchors })
    }

    pub fn from_wh_pairs(pairs: &[[R64; 2]]) -> Result<Self> {
        let anchors: Vec<_> = pairs
            .iter()
            .map(|&[w, h]| Anchor::new(w.raw(), h.raw()))
            .try_collect()?;
        Self::new(anchors)
    }

    pub fn all(&self) -> &[Anchor] {
        &self.anchors
    }

    /// The anchors owned by a detection scale.
    pub fn scale_group(&self, scale: usize) -> [Anchor; ANCHORS_PER_SCALE] {
        SCALE_ANCHOR_MASKS[scale].map(|index| self.anchors[index])
    }

    /// Finds the anchor whose shape overlaps the given size the most.
    ///
    /// Positions are ignored. Ties resolve to the lowest anchor index.
    pub fn best_match(&self, size: &HW<f64>) -> usize {
        let (best_index, _) = self.anchors.iter().enumerate().fold(
            (0, f64::NEG_INFINITY),
            |(best_index, best_iou), (index, anchor)| {
                let iou = anchor.to_hw().shape_iou_with(size);
                if iou > best_iou {
                    (index, iou)
                } else {
                    (best_index, best_iou)
                }
            },
        );
        best_index
    }

    /// Finds which detection scale and slot owns an anchor index.
    pub fn locate(index: usize) -> Option<AnchorLocation> {
        SCALE_ANCHOR_MASKS
            .iter()
            .enumerate()
            .find_map(|(scale, mask)| {
                let slot = mask.iter().position(|&owned| owned == index)?;
                Some(AnchorLocation { scale, slot })
            })
    }
}

impl Default for Anchors {
    fn default() -> Self {
        let anchors = DEFAULT_ANCHORS
            .iter()
            .map(|&[w, h]| Anchor { w, h })
            .collect();
        Self { anchors }
    }
}
