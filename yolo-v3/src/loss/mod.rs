//! Loss function building blocks.

mod bce_with_logit_loss;
mod broadcast_iou;
mod l2_loss;
mod loss;

pub use bce_with_logit_loss::*;
pub use broadcast_iou::*;
pub use l2_loss::*;
pub use loss::*;
