//! Content losses against a fixed target activation.

use crate::core::Tensor;
use crate::loss::LossTerm;

/// Plain mean-squared error against the target activation. This is what
/// the engine binds for content layers.
#[derive(Debug, Clone)]
pub struct ContentLossMse {
    target: Tensor,
}

impl ContentLossMse {
    pub fn new(target: Tensor) -> Self {
        Self { target }
    }
}

impl LossTerm for ContentLossMse {
    fn eval(&self, input: &Tensor) -> (f32, Tensor) {
        assert_eq!(input.shape(), self.target.shape());
        let n = input.len() as f32;
        let mut loss = 0.0f32;
        let mut grad = Tensor::zeros(input.channels(), input.height(), input.width());
        for (i, (&x, &t)) in input.data().iter().zip(self.target.data()).enumerate() {
            let d = x - t;
            loss += d * d;
            grad.data_mut()[i] = 2.0 * d / n;
        }
        (loss / n, grad)
    }
}

/// MSE rescaled by the L1 norm of the residual so the gradient's L1 norm
/// is approximately one regardless of the residual's magnitude:
///
/// ```text
/// L = ‖X−T‖² / (‖X−T‖₁ + ε)
/// ```
///
/// This keeps a single step size workable across layers whose activation
/// scales differ by orders of magnitude.
#[derive(Debug, Clone)]
pub struct ContentLoss {
    target: Tensor,
    eps: f32,
}

impl ContentLoss {
    pub fn new(target: Tensor) -> Self {
        Self {
            target,
            eps: 1e-8,
        }
    }
}

impl LossTerm for ContentLoss {
    fn eval(&self, input: &Tensor) -> (f32, Tensor) {
        assert_eq!(input.shape(), self.target.shape());
        let mut sq = 0.0f32;
        let mut l1 = 0.0f32;
        for (&x, &t) in input.data().iter().zip(self.target.data()) {
            let d = x - t;
            sq += d * d;
            l1 += d.abs();
        }
        let q = l1 + self.eps;
        let loss = sq / q;

        let mut grad = Tensor::zeros(input.channels(), input.height(), input.width());
        for (i, (&x, &t)) in input.data().iter().zip(self.target.data()).enumerate() {
            let d = x - t;
            grad.data_mut()[i] = 2.0 * d / q - loss * d.signum() / q;
        }
        (loss, grad)
    }
}
