//! Approximate matrix square roots via Newton–Schulz iteration.
//!
//! The style loss needs the principal square root of symmetric
//! positive-semidefinite covariance matrices, and its gradient needs the
//! inverse square root of the same product. The coupled Newton–Schulz
//! recurrence produces both in one pass without an eigendecomposition:
//!
//! ```text
//! Y₀ = A/‖A‖_F,  Z₀ = I
//! T  = (3I − ZY)/2
//! Y ← YT,  Z ← TZ
//! Y → (A/‖A‖_F)^½,  Z → (A/‖A‖_F)^(−½)
//! ```
//!
//! The iteration count is fixed, so results are deterministic; inputs are
//! expected to be ε-regularized (strictly positive-definite).

use nalgebra::DMatrix;

/// Iteration count used for all square-root solves in the style loss.
pub const NUM_ITERS: usize = 12;

/// Principal square root of a symmetric PSD matrix.
pub fn sqrtm(a: &DMatrix<f32>, iters: usize) -> DMatrix<f32> {
    sqrtm_pair(a, iters).0
}

/// Principal square root and inverse square root of a symmetric PSD matrix.
pub fn sqrtm_pair(a: &DMatrix<f32>, iters: usize) -> (DMatrix<f32>, DMatrix<f32>) {
    let n = a.nrows();
    assert_eq!(n, a.ncols());

    let norm = a.norm();
    if norm == 0.0 {
        return (DMatrix::zeros(n, n), DMatrix::zeros(n, n));
    }

    let eye = DMatrix::<f32>::identity(n, n);
    let mut y = a / norm;
    let mut z = eye.clone();
    for _ in 0..iters {
        let t = (&eye * 3.0 - &z * &y) * 0.5;
        y = &y * &t;
        z = &t * &z;
    }

    let root = norm.sqrt();
    (y * root, z / root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_spd(n: usize, seed: u64) -> DMatrix<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let b = DMatrix::from_fn(n, n, |_, _| rng.gen::<f32>() - 0.5);
        &b * b.transpose() + DMatrix::identity(n, n) * 0.1
    }

    #[test]
    fn test_sqrtm_identity() {
        let eye = DMatrix::<f32>::identity(4, 4);
        let s = sqrtm(&eye, NUM_ITERS);
        assert_relative_eq!(s, eye, epsilon = 1e-5);
    }

    #[test]
    fn test_sqrtm_diagonal() {
        let a = DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![4.0, 9.0, 16.0]));
        let s = sqrtm(&a, NUM_ITERS);
        assert_relative_eq!(s[(0, 0)], 2.0, epsilon = 1e-3);
        assert_relative_eq!(s[(1, 1)], 3.0, epsilon = 1e-3);
        assert_relative_eq!(s[(2, 2)], 4.0, epsilon = 1e-3);
        assert_relative_eq!(s[(0, 1)], 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_sqrtm_squares_back() {
        let a = random_spd(8, 42);
        let s = sqrtm(&a, NUM_ITERS);
        assert_relative_eq!(&s * &s, a, epsilon = 1e-2);
    }

    #[test]
    fn test_inverse_root_inverts() {
        let a = random_spd(6, 7);
        let (s, s_inv) = sqrtm_pair(&a, NUM_ITERS);
        let eye = DMatrix::<f32>::identity(6, 6);
        assert_relative_eq!(&s * &s_inv, eye, epsilon = 1e-2);
    }

    #[test]
    fn test_zero_matrix() {
        let a = DMatrix::<f32>::zeros(3, 3);
        let s = sqrtm(&a, NUM_ITERS);
        assert_relative_eq!(s, a, epsilon = 1e-6);
    }

    #[test]
    fn test_deterministic() {
        let a = random_spd(5, 3);
        assert_eq!(sqrtm(&a, NUM_ITERS), sqrtm(&a, NUM_ITERS));
    }
}
