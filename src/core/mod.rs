//! Core data structures and geometry utilities.
//!
//! This module contains the fundamental types used throughout the system:
//! - `Tensor`: planar C×H×W float buffer (images, feature maps, moments)
//! - Geometry: scale schedules, aspect-preserving fits, weight normalization
//! - Resampling: bicubic/bilinear for image-shaped tensors
//! - Init: working-image initialization strategies
//!
//! All types here are "pure data" - no I/O, no network logic.

pub mod geometry;
pub mod init;
pub mod resample;
mod tensor;

// Re-export public types
pub use geometry::{gen_scales, normalize_weights, size_to_fit};
pub use init::{init_image, Init};
pub use tensor::Tensor;
