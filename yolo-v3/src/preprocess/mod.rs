//! Input resizing and ground truth target assignment.

mod preprocessor;
mod resize;
mod target;

pub use preprocessor::*;
pub use resize::*;
pub use target::*;
