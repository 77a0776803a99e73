//! # pastiche: multi-scale neural style transfer in Rust
//!
//! This crate synthesizes an image that keeps a content image's spatial
//! structure while taking on the texture and color statistics of one or
//! more style images. The working image is optimized directly in pixel
//! space against a composite perceptual loss (content MSE on VGG-19
//! activations, a Wasserstein-2 distance on per-layer moment statistics,
//! and a V-β smoothness regularizer) at a √2-spaced schedule of
//! increasing resolutions, warm-starting the optimizer state across
//! scales and tracking a bias-corrected running average of the iterate.
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - `core`: fundamental data structures (tensors, geometry, resampling,
//!   initialization)
//! - `io`: file I/O (images, safetensors weight files)
//! - `nn`: the frozen VGG-19 feature extractor (forward kernels)
//! - `diff`: hand-written backward passes (input gradients)
//! - `sqrtm`: Newton–Schulz matrix square roots for the style loss
//! - `loss`: loss components and their weighted composition
//! - `optim`: Adam and L-BFGS over the working image
//! - `ema`: the bias-corrected running average
//! - `transfer`: the engine driving the whole schedule
//!
//! There is no autodiff engine: every forward kernel has an explicit
//! adjoint, and losses return `(value, gradient)` pairs. Correctness is
//! checked against finite differences in the test suite.

pub mod core;
pub mod diff;
pub mod ema;
pub mod error;
pub mod io;
pub mod loss;
pub mod nn;
pub mod optim;
pub mod sqrtm;
pub mod transfer;

// Re-export commonly used types at crate root for convenience
pub use core::{Init, Tensor};
pub use error::{Error, Result};
pub use io::WeightStore;
pub use nn::{Device, Pooling};
pub use optim::OptimizerKind;
pub use transfer::{Iterate, OutputFormat, RenderedImage, StyleTransfer, StylizeOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
