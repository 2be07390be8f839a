use crate::Activation;
use tch::{nn, Tensor};

impl nn::Module for Activation {
    fn forward(&self, xs: &Tensor) -> Tensor {
        use Activation::*;

        match *self {
            Linear => xs.shallow_clone(),
            Leaky => leaky(xs),
            LeakyRelu { negative_slope } => leaky_relu_ext(xs, Some(negative_slope)),
        }
    }
}

pub fn leaky(xs: &Tensor) -> Tensor {
    xs.clamp_min(0.0) + xs.clamp_max(0.0) * 0.1
}

/// Leaky ReLU as `max(x, slope * x)`, valid for slopes in `[0, 1]`.
pub fn leaky_relu_ext(tensor: &Tensor, negative_slope: Option<f64>) -> Tensor {
    tensor.maximum(&(tensor * negative_slope.unwrap_or(0.01)))
}
