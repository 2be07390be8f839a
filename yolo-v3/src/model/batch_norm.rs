use crate::common::*;

#[derive(Debug, Clone)]
pub struct BatchNormInit {
    pub cudnn_enabled: bool,
    pub eps: R64,
    /// The weight of the current batch when updating running statistics.
    pub momentum: R64,
    pub ws_init: Option<nn::Init>,
    pub bs_init: Option<nn::Init>,
}

impl Default for BatchNormInit {
    fn default() -> Self {
        Self {
            cudnn_enabled: true,
            eps: r64(1e-5),
            momentum: r64(0.1),
            ws_init: Some(nn::Init::Const(1.0)),
            bs_init: Some(nn::Init::Const(0.0)),
        }
    }
}

impl BatchNormInit {
    /// Creates the options from a moving average decay, where the running
    /// statistics keep `decay` of their previous value per step.
    pub fn from_decay(decay: f64) -> Result<Self> {
        ensure!(
            (0.0..1.0).contains(&decay),
            "batch norm decay must be in range [0, 1), but get {}",
            decay
        );
        Ok(Self {
            momentum: r64(1.0 - decay),
            ..Default::default()
        })
    }

    pub fn build<'a>(self, path: impl Borrow<nn::Path<'a>>, out_dim: i64) -> BatchNorm {
        let path = path.borrow();
        let Self {
            cudnn_enabled,
            eps,
            momentum,
            ws_init,
            bs_init,
        } = self;

        let ws = ws_init.map(|init| path.var("weight", &[out_dim], init));
        let bs = bs_init.map(|init| path.var("bias", &[out_dim], init));

        BatchNorm {
            running_mean: path.zeros_no_train("running_mean", &[out_dim]),
            running_var: path.ones_no_train("running_var", &[out_dim]),
            ws,
            bs,
            cudnn_enabled,
            eps: eps.raw(),
            momentum: momentum.raw(),
        }
    }
}

/// 2D batch normalization over `[batch, channels, height, width]` inputs.
#[derive(Debug)]
pub struct BatchNorm {
    running_mean: Tensor,
    running_var: Tensor,
    ws: Option<Tensor>,
    bs: Option<Tensor>,
    cudnn_enabled: bool,
    eps: f64,
    momentum: f64,
}

impl BatchNorm {
    pub fn forward_t(&self, input: &Tensor, train: bool) -> Result<Tensor> {
        let Self {
            ref running_mean,
            ref running_var,
            ref ws,
            ref bs,
            momentum,
            eps,
            cudnn_enabled,
        } = *self;

        ensure!(
            input.dim() == 4,
            "expected an input tensor with 4 dims, got {:?}",
            input.dim()
        );

        let output = Tensor::batch_norm(
            input,
            ws.as_ref(),
            bs.as_ref(),
            Some(running_mean),
            Some(running_var),
            train,
            momentum,
            eps,
            cudnn_enabled,
        );

        Ok(output)
    }

    pub fn momentum(&self) -> f64 {
        self.momentum
    }
}
