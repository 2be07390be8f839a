use super::{ConvBn2D, ConvBn2DInit, ConvOptions};
use crate::common::*;

/// Five alternating 1x1/3x3 convolutions, whose last output is the route
/// towards the next scale, followed by a 3x3 convolution feeding the
/// detection layer.
#[derive(Debug, Clone)]
pub struct YoloBlockInit {
    pub in_c: usize,
    pub filters: usize,
    pub options: ConvOptions,
}

impl YoloBlockInit {
    pub fn build<'p, P>(self, path: P) -> YoloBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            in_c,
            filters,
            options,
        } = self;

        let convs: Vec<_> = (0..5)
            .map(|index| {
                let (in_c, out_c, k) = match index {
                    0 => (in_c, filters, 1),
                    _ if index % 2 == 1 => (filters, filters * 2, 3),
                    _ => (filters * 2, filters, 1),
                };
                options
                    .conv(in_c, out_c, k)
                    .build(path / format!("conv_{}", index))
            })
            .collect();
        let output_conv = options
            .conv(filters, filters * 2, 3)
            .build(path / "conv_output");

        YoloBlock {
            convs,
            output_conv,
        }
    }
}

#[derive(Debug)]
pub struct YoloBlock {
    convs: Vec<ConvBn2D>,
    output_conv: ConvBn2D,
}

impl YoloBlock {
    /// Returns `(route, output)`.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<(Tensor, Tensor)> {
        let route = self
            .convs
            .iter()
            .try_fold(xs.shallow_clone(), |xs, conv| conv.forward_t(&xs, train))?;
        let output = self.output_conv.forward_t(&route, train)?;
        Ok((route, output))
    }
}

/// The 1x1 convolution producing `num_anchors * (5 + num_classes)` raw
/// channels per grid cell.
#[derive(Debug, Clone)]
pub struct DetectionLayerInit {
    pub in_c: usize,
    pub num_anchors: usize,
    pub num_classes: usize,
}

impl DetectionLayerInit {
    pub fn build<'p, P>(self, path: P) -> DetectionLayer
    where
        P: Borrow<nn::Path<'p>>,
    {
        let Self {
            in_c,
            num_anchors,
            num_classes,
        } = self;
        let out_c = num_anchors * (5 + num_classes);
        let conv = ConvBn2DInit::linear(in_c, out_c, 1).build(path);
        DetectionLayer { conv }
    }
}

#[derive(Debug)]
pub struct DetectionLayer {
    conv: ConvBn2D,
}

impl DetectionLayer {
    /// Produces a `[batch, rows, cols, channels]` feature map.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.conv.forward_t(xs, train)?;
        Ok(xs.f_permute(&[0, 2, 3, 1])?)
    }
}
