//! Backward passes (input gradients).
//!
//! The system has no autodiff engine: every forward kernel in
//! [`crate::nn`] has a hand-written adjoint here, and
//! [`backprop_to_image`] walks the forward tape in reverse to turn
//! per-layer loss cotangents into a single gradient with respect to the
//! working image.

mod layer_grads;

use std::collections::BTreeMap;

use crate::core::Tensor;
use crate::nn::{Layer, Tape, VggFeatures};

pub use layer_grads::{conv2d_input_grad, normalize_grad, pool_grad, relu_grad};

fn layer_input_grad(layer: &Layer, input: &Tensor, grad_out: &Tensor) -> Tensor {
    match layer {
        Layer::Conv(conv) => conv2d_input_grad(conv, grad_out),
        Layer::Relu => relu_grad(input, grad_out),
        Layer::Pool(pool) => pool_grad(pool, input, grad_out),
    }
}

/// Backpropagate loss cotangents to an image gradient.
///
/// `cotangents` maps layer index -> dL/d(activation after that layer);
/// `input_cotangent` is an optional dL/d(raw input) contribution from
/// pixel-space terms (the TV regularizer). The tape must come from the
/// same forward pass the cotangents were computed on.
pub fn backprop_to_image(
    model: &VggFeatures,
    tape: &Tape,
    cotangents: &BTreeMap<usize, Tensor>,
    input_cotangent: Option<&Tensor>,
) -> Tensor {
    let stack = model.layer_stack();
    let mut grad: Option<Tensor> = None;

    if let Some(&last) = cotangents.keys().next_back() {
        assert!(last < tape.inputs.len(), "cotangent beyond recorded tape");
        for i in (0..=last).rev() {
            if let Some(cot) = cotangents.get(&i) {
                match grad.as_mut() {
                    Some(g) => g.add_scaled(cot, 1.0),
                    None => grad = Some(cot.clone()),
                }
            }
            let g = grad.take().expect("deepest cotangent seeds the walk");
            grad = Some(layer_input_grad(&stack[i], &tape.inputs[i], &g));
        }
    }

    // The walk ends at the normalized input; undo the normalization and
    // fold in any pixel-space cotangent.
    let mut image_grad = match grad {
        Some(g) => normalize_grad(&g),
        None => {
            let (c, h, w) = tape.inputs[0].shape();
            Tensor::zeros(c, h, w)
        }
    };
    if let Some(cot) = input_cotangent {
        image_grad.add_scaled(cot, 1.0);
    }
    image_grad
}
