use crate::common::*;

/// Nearest neighbor upsampling to the spatial size of a reference tensor.
#[derive(Debug, Clone)]
pub struct UpSample2D;

impl UpSample2D {
    pub fn forward_like(&self, input: &Tensor, reference: &Tensor) -> Result<Tensor> {
        let (_b, _c, in_h, in_w) = input.size4()?;
        let (_b, _c, out_h, out_w) = reference.size4()?;
        ensure!(
            out_h >= in_h && out_w >= in_w,
            "cannot upsample from {}x{} to {}x{}",
            in_h,
            in_w,
            out_h,
            out_w
        );
        let output = input.f_upsample_nearest2d(&[out_h, out_w], None, None)?;
        Ok(output)
    }
}
