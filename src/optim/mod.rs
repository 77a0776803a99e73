//! Optimizers over the working image.
//!
//! This module contains everything that mutates the image in place:
//! - Adam (per-pixel moment state, resized across scales)
//! - L-BFGS (curvature history, rebuilt at every scale)
//!
//! Both take a re-evaluable loss closure: a quasi-Newton method may probe
//! the objective more than once per step, so the engine hands the
//! optimizer a closure rather than a precomputed gradient.

pub mod adam;
pub mod lbfgs;

use crate::core::Tensor;
use crate::error::{Error, Result};

pub use adam::Adam;
pub use lbfgs::Lbfgs;

/// A re-evaluable objective: image in, (loss, dL/dimage) out.
pub type LossClosure<'a> = dyn FnMut(&Tensor) -> (f32, Tensor) + 'a;

/// An optimizer that updates the image tensor itself.
pub trait ImageOptimizer {
    /// Evaluate the closure (at least once) and take one step in place.
    /// Returns the loss at the pre-step iterate.
    fn step(&mut self, image: &mut Tensor, closure: &mut LossClosure) -> f32;

    /// Whether the engine should clamp the image to [0, 1] after each
    /// step. Line-search methods manage their own iterates and must not
    /// be clamped mid-trajectory.
    fn clamps_image(&self) -> bool;
}

/// Optimizer families selectable per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Adam,
    Lbfgs,
}

impl OptimizerKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "adam" => Ok(Self::Adam),
            "lbfgs" => Ok(Self::Lbfgs),
            other => Err(Error::Config(format!(
                "optimizer must be one of 'adam', 'lbfgs', got '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optimizer_kind() {
        assert_eq!(OptimizerKind::parse("adam").unwrap(), OptimizerKind::Adam);
        assert_eq!(OptimizerKind::parse("lbfgs").unwrap(), OptimizerKind::Lbfgs);
        assert!(OptimizerKind::parse("sgd").is_err());
    }
}
