//! Decoding of raw feature maps into boxes.

mod predict;
mod reorg;

pub use predict::*;
pub use reorg::*;
