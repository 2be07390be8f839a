use super::{Rect, TLBR};
use crate::{common::*, RectNum, HW};

/// An axis-aligned scale-and-shift transform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sy: T,
    pub sx: T,
    pub ty: T,
    pub tx: T,
}

impl<T> Transform<T>
where
    T: Copy + Num + PartialOrd,
{
    pub fn from_rects<R>(src: &R, tgt: &R) -> Self
    where
        R: Rect<Type = T>,
    {
        let sy = tgt.h() / src.h();
        let sx = tgt.w() / src.w();
        let ty = tgt.t() - src.t() * sy;
        let tx = tgt.l() - src.l() * sx;

        Self { sy, sx, ty, tx }
    }

    /// Maps an image of `src_size` onto `tgt_size` by stretching both axes.
    pub fn from_sizes_exact(src_size: &HW<T>, tgt_size: &HW<T>) -> Self {
        let zero = T::zero();
        let src = TLBR::from_tlbr([zero, zero, src_size.h(), src_size.w()]);
        let tgt = TLBR::from_tlbr([zero, zero, tgt_size.h(), tgt_size.w()]);
        Self::from_rects(&src, &tgt)
    }
}
