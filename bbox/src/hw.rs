use crate::common::*;

/// A box size without position, e.g. an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HW<T> {
    h: T,
    w: T,
}

impl<T> HW<T>
where
    T: Num + PartialOrd + Copy,
{
    pub fn try_from_hw(hw: [T; 2]) -> Result<Self> {
        let [h, w] = hw;
        let zero = T::zero();
        ensure!(
            h >= zero && w >= zero,
            "height and width parameters must be non-negative"
        );
        Ok(Self { h, w })
    }

    pub fn from_hw(hw: [T; 2]) -> Self {
        Self::try_from_hw(hw).unwrap()
    }

    pub fn area(&self) -> T {
        self.w * self.h
    }

    pub fn w(&self) -> T {
        self.w
    }

    pub fn h(&self) -> T {
        self.h
    }
}

impl<T> HW<T>
where
    T: Float,
{
    /// IoU of two sizes with both boxes centered at the origin.
    ///
    /// Only the shapes are compared, so the intersection is the product of
    /// the smaller height and the smaller width.
    pub fn shape_iou_with(&self, other: &HW<T>) -> T {
        let two = T::one() + T::one();
        let inter_h = ((self.h / two).min(other.h / two) - (-self.h / two).max(-other.h / two))
            .max(T::zero());
        let inter_w = ((self.w / two).min(other.w / two) - (-self.w / two).max(-other.w / two))
            .max(T::zero());
        let inter_area = inter_h * inter_w;
        inter_area / (self.area() + other.area() - inter_area)
    }
}
