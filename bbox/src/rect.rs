use crate::common::*;

/// The generic rectangle.
///
/// The accessors follow image conventions: `t`/`b` run along the y axis and
/// `l`/`r` along the x axis.
pub trait Rect {
    type Type;

    fn t(&self) -> Self::Type;
    fn l(&self) -> Self::Type;
    fn b(&self) -> Self::Type;
    fn r(&self) -> Self::Type;
    fn cy(&self) -> Self::Type;
    fn cx(&self) -> Self::Type;
    fn h(&self) -> Self::Type;
    fn w(&self) -> Self::Type;

    fn try_from_tlbr(tlbr: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;

    fn try_from_cycxhw(cycxhw: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd,
{
    fn from_tlbr(tlbr: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_tlbr(tlbr).unwrap()
    }

    fn from_cycxhw(cycxhw: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_cycxhw(cycxhw).unwrap()
    }

    /// Builds a rectangle from `[x_min, y_min, x_max, y_max]` corners.
    fn try_from_xyxy(xyxy: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized,
    {
        let [x0, y0, x1, y1] = xyxy;
        Self::try_from_tlbr([y0, x0, y1, x1])
    }

    fn cycxhw(&self) -> [Self::Type; 4] {
        [self.cy(), self.cx(), self.h(), self.w()]
    }

    /// Center and size in `[cx, cy, w, h]` order.
    fn cxcywh(&self) -> [Self::Type; 4] {
        [self.cx(), self.cy(), self.w(), self.h()]
    }

    fn tlbr(&self) -> [Self::Type; 4] {
        [self.t(), self.l(), self.b(), self.r()]
    }

    fn xyxy(&self) -> [Self::Type; 4] {
        [self.l(), self.t(), self.r(), self.b()]
    }

    fn hw(&self) -> [Self::Type; 2] {
        [self.h(), self.w()]
    }

    fn area(&self) -> <Self::Type as Mul<Self::Type>>::Output
    where
        Self::Type: Mul<Self::Type>,
    {
        self.h() * self.w()
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd,
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TLBR;

    #[test]
    fn xyxy_order() -> Result<()> {
        let rect = TLBR::try_from_xyxy([1.0, 2.0, 5.0, 10.0])?;
        assert_eq!(rect.tlbr(), [2.0, 1.0, 10.0, 5.0]);
        assert_eq!(rect.xyxy(), [1.0, 2.0, 5.0, 10.0]);
        assert_eq!(rect.cxcywh(), [3.0, 6.0, 4.0, 8.0]);
        Ok(())
    }
}
