use crate::common::*;

/// Squared error loss with optional per-element weights.
#[derive(Debug)]
pub struct L2Loss {
    reduction: Reduction,
}

impl L2Loss {
    pub fn new(reduction: Reduction) -> Self {
        Self { reduction }
    }

    pub fn forward(&self, input: &Tensor, target: &Tensor, weight: Option<&Tensor>) -> Tensor {
        debug_assert_eq!(
            input.size(),
            target.size(),
            "input and target tensors must have equal shape"
        );

        let diff = input - target;
        let loss = &diff * &diff;
        let loss = match weight {
            Some(weight) => loss * weight,
            None => loss,
        };

        match self.reduction {
            Reduction::None => loss,
            Reduction::Sum => loss.sum(Kind::Float),
            Reduction::Mean => loss.mean(Kind::Float),
            _ => panic!("reduction {:?} is not supported", self.reduction),
        }
    }
}
