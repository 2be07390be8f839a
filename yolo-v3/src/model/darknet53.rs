use super::{BatchNormInit, ConvBn2D, ConvBn2DInit};
use crate::common::*;
use tch_act::Activation;

/// `(filters, num_blocks)` of each downsampling stage. Each stage starts with
/// a strided convolution to `2 * filters` channels.
const STAGES: [(usize, usize); 5] = [(32, 1), (64, 2), (128, 8), (256, 8), (512, 4)];

/// Shared options of all convolutions in the backbone and heads.
#[derive(Debug, Clone)]
pub struct ConvOptions {
    pub activation: Activation,
    pub batch_norm: BatchNormInit,
}

impl ConvOptions {
    pub fn conv(&self, in_c: usize, out_c: usize, k: usize) -> ConvBn2DInit {
        ConvBn2DInit {
            activation: self.activation,
            batch_norm: Some(self.batch_norm.clone()),
            ..ConvBn2DInit::new(in_c, out_c, k)
        }
    }

    pub fn strided_conv(&self, in_c: usize, out_c: usize, k: usize, s: usize) -> ConvBn2DInit {
        ConvBn2DInit {
            s,
            ..self.conv(in_c, out_c, k)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Darknet53Init {
    pub in_c: usize,
    pub options: ConvOptions,
}

impl Darknet53Init {
    pub fn build<'p, P>(self, path: P) -> Darknet53
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { in_c, options } = self;

        let stem = options.conv(in_c, 32, 3).build(path / "stem");
        let stages: Vec<_> = STAGES
            .iter()
            .enumerate()
            .map(|(index, &(filters, num_blocks))| {
                let stage_path = path / format!("stage_{}", index);
                let down = options
                    .strided_conv(filters, filters * 2, 3, 2)
                    .build(&stage_path / "down");
                let blocks: Vec<_> = (0..num_blocks)
                    .map(|block_index| {
                        ResidualBlockInit {
                            filters,
                            options: options.clone(),
                        }
                        .build(&stage_path / format!("block_{}", block_index))
                    })
                    .collect();
                Stage { down, blocks }
            })
            .collect();

        Darknet53 { stem, stages }
    }
}

/// The Darknet-53 feature extractor.
#[derive(Debug)]
pub struct Darknet53 {
    stem: ConvBn2D,
    stages: Vec<Stage>,
}

/// Backbone features at strides 8, 16 and 32.
#[derive(Debug, TensorLike)]
pub struct Darknet53Output {
    pub route_1: Tensor,
    pub route_2: Tensor,
    pub output: Tensor,
}

impl Darknet53 {
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Darknet53Output> {
        let mut xs = self.stem.forward_t(xs, train)?;
        let mut features = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            xs = stage.forward_t(&xs, train)?;
            features.push(xs.shallow_clone());
        }

        let mut features = features.into_iter().skip(2);
        let (route_1, route_2, output) = features
            .next_tuple()
            .ok_or_else(|| format_err!("the backbone must have 5 stages"))?;

        Ok(Darknet53Output {
            route_1,
            route_2,
            output,
        })
    }

    pub fn num_layers(&self) -> usize {
        1 + self
            .stages
            .iter()
            .map(|stage| 1 + stage.blocks.len() * 2)
            .sum::<usize>()
    }
}

#[derive(Debug)]
struct Stage {
    down: ConvBn2D,
    blocks: Vec<ResidualBlock>,
}

impl Stage {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let xs = self.down.forward_t(xs, train)?;
        self.blocks
            .iter()
            .try_fold(xs, |xs, block| block.forward_t(&xs, train))
    }
}

#[derive(Debug, Clone)]
struct ResidualBlockInit {
    filters: usize,
    options: ConvOptions,
}

impl ResidualBlockInit {
    fn build<'p, P>(self, path: P) -> ResidualBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { filters, options } = self;

        ResidualBlock {
            conv1: options.conv(filters * 2, filters, 1).build(path / "conv1"),
            conv2: options.conv(filters, filters * 2, 3).build(path / "conv2"),
        }
    }
}

#[derive(Debug)]
struct ResidualBlock {
    conv1: ConvBn2D,
    conv2: ConvBn2D,
}

impl ResidualBlock {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        let shortcut = xs;
        let xs = self.conv1.forward_t(xs, train)?;
        let xs = self.conv2.forward_t(&xs, train)?;
        Ok(xs.f_add(shortcut)?)
    }
}
