//! Crate-level error types.

use thiserror::Error;

use crate::io::weights::WeightsError;

/// Errors surfaced by the stylization engine and its collaborators.
///
/// Configuration problems are raised before any model or image work begins.
/// Numerical degradation (e.g. a square-root solve drifting on an
/// ill-conditioned matrix) is not a distinct variant: it shows up as a
/// non-finite loss and the run is simply restarted by the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid engine or run configuration (bad device count, unknown
    /// initialization/optimizer/format/pooling name, mismatched lengths).
    #[error("configuration error: {0}")]
    Config(String),

    /// Input image too small for the deepest requested network layer.
    #[error("input is {width}x{height} but must be at least {min_size}x{min_size}")]
    InputTooSmall {
        width: usize,
        height: usize,
        min_size: usize,
    },

    /// Pretrained weight file could not be read or validated.
    #[error(transparent)]
    Weights(#[from] WeightsError),

    /// Image decode/encode failure.
    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
