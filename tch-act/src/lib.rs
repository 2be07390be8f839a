#[cfg(feature = "tch")]
pub use impls::*;
#[cfg(feature = "tch")]
mod impls;

#[cfg(feature = "tch")]
pub use r#trait::*;
#[cfg(feature = "tch")]
mod r#trait;

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Activation {
    Linear,
    /// Darknet leaky activation with a fixed slope of 0.1.
    Leaky,
    LeakyRelu {
        negative_slope: f64,
    },
}

impl Activation {
    pub fn leaky_relu(negative_slope: f64) -> Self {
        Self::LeakyRelu { negative_slope }
    }
}
