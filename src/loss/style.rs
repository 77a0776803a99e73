//! Wasserstein-2 style loss on activation moment statistics.
//!
//! The target for each style layer is the spatial mean vector and raw
//! second-moment matrix of the activations. Both are linear in the
//! sample, so targets from several weighted style images can be
//! accumulated directly, which a covariance or Gram matrix would not
//! permit. The loss is the squared Bures/Wasserstein-2 distance between
//! Gaussians with the target and current moments:
//!
//! ```text
//! W₂² = mean((μ_X − μ_T)²) + tr(Σ_X + Σ_T − 2·(Σ_T^½ Σ_X Σ_T^½)^½) / d
//! ```
//!
//! The gradient with respect to the current covariance uses the inverse
//! square root the Newton–Schulz solver produces alongside the root:
//! ∂/∂Σ_X tr((A Σ_X A)^½) = ½·A·(A Σ_X A)^(−½)·A with A = Σ_T^½.

use nalgebra::{DMatrix, DVector};

use crate::core::Tensor;
use crate::loss::LossTerm;
use crate::sqrtm;

/// Spatial mean and raw second moment of an activation map; the linearly
/// combinable style target representation.
#[derive(Debug, Clone)]
pub struct MomentStats {
    pub mean: DVector<f32>,
    pub srm: DMatrix<f32>,
}

impl MomentStats {
    /// Compute (μ, S) for a C×H×W activation: μ_c = mean over positions,
    /// S = X·Xᵀ/N with X the C×N matrix of activation columns.
    pub fn from_activation(feat: &Tensor) -> Self {
        let (c, h, w) = feat.shape();
        let n = h * w;
        // Planar layout means the data slice *is* row-major C×N.
        let x = DMatrix::from_row_slice(c, n, feat.data());
        let mean = x.column_sum() / n as f32;
        let srm = (&x * x.transpose()) / n as f32;
        Self { mean, srm }
    }

    /// Zero statistics of dimension `c`, for weighted accumulation.
    pub fn zeros(c: usize) -> Self {
        Self {
            mean: DVector::zeros(c),
            srm: DMatrix::zeros(c, c),
        }
    }

    /// `self += other * weight`. Valid because both statistics are linear
    /// in the sample.
    pub fn accumulate(&mut self, other: &Self, weight: f32) {
        self.mean.axpy(weight, &other.mean, 1.0);
        self.srm += &other.srm * weight;
    }

    /// Covariance from the moments: S − μ⊗μ.
    pub fn covariance(&self) -> DMatrix<f32> {
        &self.srm - &self.mean * self.mean.transpose()
    }
}

/// One style layer's W2 loss against a fixed moment target.
#[derive(Debug, Clone)]
pub struct StyleLossW2 {
    mean: DVector<f32>,
    /// Target covariance, ε-regularized.
    cov: DMatrix<f32>,
    /// Σ_T^½, computed once at construction.
    cov_sqrt: DMatrix<f32>,
    eps: f32,
}

impl StyleLossW2 {
    pub fn new(target: &MomentStats) -> Self {
        let eps = 1e-4;
        let c = target.mean.len();
        let cov = target.covariance() + DMatrix::identity(c, c) * eps;
        let cov_sqrt = sqrtm::sqrtm(&cov, sqrtm::NUM_ITERS);
        Self {
            mean: target.mean.clone(),
            cov,
            cov_sqrt,
            eps,
        }
    }
}

impl LossTerm for StyleLossW2 {
    fn eval(&self, input: &Tensor) -> (f32, Tensor) {
        let (c, h, w) = input.shape();
        assert_eq!(c, self.mean.len());
        let n = (h * w) as f32;
        let d = c as f32;

        let stats = MomentStats::from_activation(input);
        let cov_x = stats.covariance() + DMatrix::identity(c, c) * self.eps;

        let mean_diff = &stats.mean - &self.mean;
        let mean_term = mean_diff.norm_squared() / d;

        // One square-root solve per evaluation; the paired inverse root
        // feeds the gradient.
        let inner = &self.cov_sqrt * &cov_x * &self.cov_sqrt;
        let (inner_sqrt, inner_inv_sqrt) = sqrtm::sqrtm_pair(&inner, sqrtm::NUM_ITERS);
        let cov_term = (self.cov.trace() + cov_x.trace() - 2.0 * inner_sqrt.trace()) / d;

        let loss = mean_term + cov_term;

        // dL/dΣ_X, symmetrized against iteration drift.
        let g_raw =
            (DMatrix::identity(c, c) - &self.cov_sqrt * inner_inv_sqrt * &self.cov_sqrt) / d;
        let g = (&g_raw + g_raw.transpose()) * 0.5;

        // dL/dμ: the direct mean term plus the −μ⊗μ path through Σ_X.
        let mut dmu = mean_diff * (2.0 / d);
        dmu -= (&g * &stats.mean) * 2.0;

        // Per-position gradient: (2/N)·G·x_p + dμ/N.
        let x = DMatrix::from_row_slice(c, h * w, input.data());
        let mut grad_mat = (&g * &x) * (2.0 / n);
        for mut col in grad_mat.column_iter_mut() {
            col.axpy(1.0 / n, &dmu, 1.0);
        }

        // nalgebra stores column-major; transpose back to planar C×(HW).
        let mut grad = Tensor::zeros(c, h, w);
        for (ci, row) in grad_mat.row_iter().enumerate() {
            grad.channel_mut(ci)
                .iter_mut()
                .zip(row.iter())
                .for_each(|(dst, &v)| *dst = v);
        }
        (loss, grad)
    }
}
