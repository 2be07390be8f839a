//! The YOLO-v3 network.

mod batch_norm;
mod concat_2d;
mod conv_bn_2d;
mod darknet53;
mod up_sample_2d;
mod yolo_block;
mod yolo_v3;

pub use batch_norm::*;
pub use concat_2d::*;
pub use conv_bn_2d::*;
pub use darknet53::*;
pub use up_sample_2d::*;
pub use yolo_block::*;
pub use yolo_v3::*;
