use super::{BatchNorm, BatchNormInit};
use crate::common::*;
use tch_act::{Activation, TensorActivationExt as _};

/// Options of a convolution followed by optional batch norm and activation.
///
/// Strided convolutions pad the input explicitly by `k - 1` pixels, split
/// between the leading and trailing edges, so the output size does not
/// depend on the input parity. Unit strides use "same" padding.
#[derive(Debug, Clone)]
pub struct ConvBn2DInit {
    pub in_c: usize,
    pub out_c: usize,
    pub k: usize,
    pub s: usize,
    pub bias: bool,
    pub activation: Activation,
    pub batch_norm: Option<BatchNormInit>,
}

impl ConvBn2DInit {
    pub fn new(in_c: usize, out_c: usize, k: usize) -> Self {
        Self {
            in_c,
            out_c,
            k,
            s: 1,
            bias: false,
            activation: Activation::Leaky,
            batch_norm: Some(Default::default()),
        }
    }

    /// A plain convolution with zero-initialized bias, as used by detection layers.
    pub fn linear(in_c: usize, out_c: usize, k: usize) -> Self {
        Self {
            bias: true,
            activation: Activation::Linear,
            batch_norm: None,
            ..Self::new(in_c, out_c, k)
        }
    }

    pub fn build<'p, P>(self, path: P) -> ConvBn2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_c,
            out_c,
            k,
            s,
            bias,
            activation,
            batch_norm,
        } = self;

        let (padding, fixed_padding) = if s > 1 {
            let pad_total = k as i64 - 1;
            let pad_beg = pad_total / 2;
            (0, Some((pad_beg, pad_total - pad_beg)))
        } else {
            (k as i64 / 2, None)
        };

        let conv = nn::conv2d(
            path / "conv",
            in_c as i64,
            out_c as i64,
            k as i64,
            nn::ConvConfig {
                stride: s as i64,
                padding,
                bias,
                bs_init: nn::Init::Const(0.0),
                ..Default::default()
            },
        );
        let bn = batch_norm.map(|init| init.build(path / "bn", out_c as i64));

        ConvBn2D {
            conv,
            bn,
            activation,
            fixed_padding,
        }
    }
}

#[derive(Debug)]
pub struct ConvBn2D {
    conv: nn::Conv2D,
    bn: Option<BatchNorm>,
    activation: Activation,
    fixed_padding: Option<(i64, i64)>,
}

impl ConvBn2D {
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            ref conv,
            ref bn,
            activation,
            fixed_padding,
        } = *self;

        let xs = match fixed_padding {
            Some((beg, end)) => xs.f_constant_pad_nd(&[beg, end, beg, end])?,
            None => xs.shallow_clone(),
        };
        let xs = xs.apply(conv);
        let xs = match bn {
            Some(bn) => bn.forward_t(&xs, train)?,
            None => xs,
        };

        Ok(xs.activation(activation))
    }
}
