//! YOLO-v3 detector built on libtorch.
//!
//! The crate provides the Darknet-53 backbone with multi-scale detection
//! heads, the decoding of raw feature maps into boxes, the assignment of
//! ground truth boxes to anchors, and the training loss.

mod common;
pub mod anchors;
pub mod config;
pub mod detection;
pub mod loss;
pub mod model;
pub mod preprocess;
pub mod registry;

pub use anchors::*;
pub use config::Config;
pub use registry::ModelKind;
