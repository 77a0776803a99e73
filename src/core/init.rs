//! Working-image initialization strategies.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::core::{resample, Tensor};
use crate::error::{Error, Result};

/// How the working image is seeded before the coarsest scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// Bicubic-resized content image.
    Content,
    /// Mid-gray with a tiny uniform jitter to break symmetry.
    Gray,
    /// Uniform noise in [0, 1).
    Uniform,
    /// Truncated normal, mean 0.5, std 0.25, clipped to [0, 1].
    Normal,
    /// Per-channel truncated normal with mean/variance pooled from the
    /// style images under the per-image weights.
    StyleStats,
}

impl Init {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "content" => Ok(Self::Content),
            "gray" => Ok(Self::Gray),
            "uniform" => Ok(Self::Uniform),
            "normal" => Ok(Self::Normal),
            "style_stats" => Ok(Self::StyleStats),
            other => Err(Error::Config(format!(
                "init must be one of 'content', 'gray', 'uniform', 'normal', \
                 'style_stats', got '{other}'"
            ))),
        }
    }
}

/// Sample a normal distribution truncated to [0, 1] by rejection. A zero
/// (or denormal) std collapses to the clamped mean.
fn trunc_normal<R: Rng>(rng: &mut R, mean: f32, std: f32) -> f32 {
    if std <= f32::EPSILON {
        return mean.clamp(0.0, 1.0);
    }
    let dist = Normal::new(mean, std).expect("std is finite and positive");
    loop {
        let v = dist.sample(&mut *rng);
        if (0.0..=1.0).contains(&v) {
            return v;
        }
    }
}

/// Build the initial working image at `width`×`height`.
///
/// `styles` and `style_weights` are only consulted for [`Init::StyleStats`];
/// the weights are assumed already normalized so |weights| sum to 1.
pub fn init_image<R: Rng>(
    kind: Init,
    content: &Tensor,
    styles: &[Tensor],
    style_weights: &[f32],
    width: usize,
    height: usize,
    rng: &mut R,
) -> Tensor {
    match kind {
        Init::Content => {
            let mut t = resample::resize_bicubic(content, width, height);
            t.clamp_in_place(0.0, 1.0);
            t
        }
        Init::Gray => {
            let mut t = Tensor::zeros(3, height, width);
            for v in t.data_mut() {
                *v = rng.gen::<f32>() / 255.0 + 0.5;
            }
            t
        }
        Init::Uniform => {
            let mut t = Tensor::zeros(3, height, width);
            for v in t.data_mut() {
                *v = rng.gen::<f32>();
            }
            t
        }
        Init::Normal => {
            let mut t = Tensor::zeros(3, height, width);
            for v in t.data_mut() {
                *v = trunc_normal(rng, 0.5, 0.25);
            }
            t
        }
        Init::StyleStats => {
            let mut means = [0.0f32; 3];
            let mut variances = [0.0f32; 3];
            for (style, &w) in styles.iter().zip(style_weights) {
                let m = style.channel_means();
                let v = style.channel_variances();
                for c in 0..3 {
                    means[c] += m[c] * w;
                    variances[c] += v[c] * w;
                }
            }
            let mut t = Tensor::zeros(3, height, width);
            for c in 0..3 {
                let std = variances[c].max(0.0).sqrt();
                for v in t.channel_mut(c) {
                    *v = trunc_normal(rng, means[c], std);
                }
            }
            t
        }
    }
}
