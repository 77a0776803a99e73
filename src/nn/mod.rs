//! The pretrained feature extractor and its layer kernels.
//!
//! Forward passes only; the matching backward kernels live in
//! [`crate::diff`].

pub mod layers;
pub mod vgg;

#[cfg(test)]
pub mod test_weights;

pub use layers::{Conv2d, Layer, Padding, Pool, PoolKind};
pub use vgg::{
    Device, Features, LayerKey, Pooling, Tape, VggFeatures, CONTENT_LAYERS, STYLE_LAYERS,
};
