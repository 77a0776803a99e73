//! Loss components and their weighted composition.
//!
//! Every component returns its value together with the gradient with
//! respect to its own input in a single pass; [`SumLoss`] turns a feature
//! set into a total value plus per-layer cotangents that
//! [`crate::diff::backprop_to_image`] folds into one image gradient.

mod content;
mod style;
mod tv;

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::Tensor;
use crate::nn::{Device, Features, LayerKey};

pub use content::{ContentLoss, ContentLossMse};
pub use style::{MomentStats, StyleLossW2};
pub use tv::VBetaLoss;

/// A loss component bound to one activation.
pub trait LossTerm: Send + Sync {
    /// Value and gradient with respect to the bound activation,
    /// unweighted.
    fn eval(&self, input: &Tensor) -> (f32, Tensor);
}

/// One weighted term of the composite loss.
pub struct Term {
    label: String,
    layer: LayerKey,
    weight: f32,
    device: Device,
    inner: Box<dyn LossTerm>,
}

impl Term {
    pub fn new(
        label: impl Into<String>,
        layer: LayerKey,
        weight: f32,
        device: Device,
        inner: Box<dyn LossTerm>,
    ) -> Self {
        Self {
            label: label.into(),
            layer,
            weight,
            device,
            inner,
        }
    }
}

/// Per-evaluation output of the composite loss: the summed value and the
/// cotangents the backward pass needs.
pub struct LossEval {
    pub value: f32,
    /// dL/d(activation after layer i), per feature-stack layer.
    pub cotangents: BTreeMap<usize, Tensor>,
    /// dL/d(raw input) from pixel-space terms.
    pub input_cotangent: Option<Tensor>,
}

/// Weighted sum of loss terms.
///
/// Terms may be pinned to different devices by the extractor's layer
/// plan; the summed value is formed on the device of the *last* term
/// (with one device kind the cast is the identity, but the convention is
/// part of the contract and `device()` reports it).
pub struct SumLoss {
    terms: Vec<Term>,
    verbose: bool,
}

impl SumLoss {
    pub fn new(terms: Vec<Term>) -> Self {
        Self {
            terms,
            verbose: false,
        }
    }

    /// Log each term's scalar value per evaluation (diagnostic only).
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Device the total is accumulated on: the last term's.
    pub fn device(&self) -> Device {
        self.terms.last().map(|t| t.device).unwrap_or(Device::Cpu)
    }

    pub fn eval(&self, feats: &Features) -> LossEval {
        let mut value = 0.0f32;
        let mut cotangents: BTreeMap<usize, Tensor> = BTreeMap::new();
        let mut input_cotangent: Option<Tensor> = None;

        for term in &self.terms {
            let (v, grad) = term.inner.eval(feats.get(term.layer));
            if self.verbose {
                debug!(term = %term.label, value = v, weighted = v * term.weight, "loss term");
            }
            value += v * term.weight;
            match term.layer {
                LayerKey::Input => match input_cotangent.as_mut() {
                    Some(acc) => acc.add_scaled(&grad, term.weight),
                    None => {
                        let mut g = grad;
                        for x in g.data_mut() {
                            *x *= term.weight;
                        }
                        input_cotangent = Some(g);
                    }
                },
                LayerKey::Layer(i) => match cotangents.get_mut(&i) {
                    Some(acc) => acc.add_scaled(&grad, term.weight),
                    None => {
                        let mut g = grad;
                        for x in g.data_mut() {
                            *x *= term.weight;
                        }
                        cotangents.insert(i, g);
                    }
                },
            }
        }

        LossEval {
            value,
            cotangents,
            input_cotangent,
        }
    }
}
