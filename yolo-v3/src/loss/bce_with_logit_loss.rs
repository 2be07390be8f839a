use crate::common::*;

#[derive(Debug)]
pub struct BceWithLogitsLossInit {
    pub reduction: Reduction,
}

impl BceWithLogitsLossInit {
    pub fn default(reduction: Reduction) -> Self {
        Self { reduction }
    }

    pub fn build(self) -> BceWithLogitsLoss {
        let Self { reduction } = self;
        BceWithLogitsLoss { reduction }
    }
}

/// Sigmoid cross entropy computed from logits, with optional per-element weights.
#[derive(Debug)]
pub struct BceWithLogitsLoss {
    reduction: Reduction,
}

impl BceWithLogitsLoss {
    /// The `weight` tensor broadcasts to the input shape. Zero weights
    /// exclude elements from the loss.
    pub fn forward(&self, input: &Tensor, target: &Tensor, weight: Option<&Tensor>) -> Tensor {
        debug_assert_eq!(
            input.size(),
            target.size(),
            "input and target tensors must have equal shape"
        );
        debug_assert!(
            bool::from(target.ge(0.0).logical_and(&target.le(1.0)).all()),
            "target values must be in range of [0.0, 1.0]"
        );

        let loss = input.binary_cross_entropy_with_logits(
            target,
            None::<&Tensor>,
            None::<&Tensor>,
            Reduction::None,
        );
        let loss = match weight {
            Some(weight) => loss * weight,
            None => loss,
        };

        match self.reduction {
            Reduction::None => loss,
            Reduction::Sum => loss.sum(Kind::Float),
            _ => panic!("reduction {:?} is not supported", self.reduction),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn bce_of_zero_logit() {
        let loss_fn = BceWithLogitsLossInit::default(Reduction::None).build();
        let input = Tensor::zeros(&[2, 3, 1], (Kind::Float, Device::Cpu));
        let target = Tensor::ones(&[2, 3, 1], (Kind::Float, Device::Cpu));
        let loss = loss_fn.forward(&input, &target, None);
        assert_eq!(loss.size(), vec![2, 3, 1]);
        assert_abs_diff_eq!(loss.double_value(&[1, 2, 0]), 2f64.ln(), epsilon = 1e-6);
    }

    #[test]
    fn weights_mask_out_elements() {
        let loss_fn = BceWithLogitsLossInit::default(Reduction::Sum).build();
        let input = Tensor::zeros(&[4, 2], (Kind::Float, Device::Cpu));
        let target = Tensor::zeros(&[4, 2], (Kind::Float, Device::Cpu));
        let mask = Tensor::of_slice(&[1f32, 0.0, 0.0, 1.0]).view([4, 1]);
        let loss = loss_fn.forward(&input, &target, Some(&mask));
        assert_abs_diff_eq!(loss.double_value(&[]), 4.0 * 2f64.ln(), epsilon = 1e-5);
    }

    #[test]
    #[should_panic(expected = "is not supported")]
    fn reject_mean_reduction() {
        let loss_fn = BceWithLogitsLossInit::default(Reduction::Mean).build();
        let input = Tensor::zeros(&[2], (Kind::Float, Device::Cpu));
        let target = Tensor::zeros(&[2], (Kind::Float, Device::Cpu));
        let _ = loss_fn.forward(&input, &target, None);
    }
}
