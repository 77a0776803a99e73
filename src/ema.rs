//! Bias-corrected exponential moving average of the working image.

use crate::core::Tensor;

/// Exponential moving average with the zero-initialization bias correction
/// from Kingma & Ba (Adam).
///
/// The accumulator starts at zero and is seeded with one update at
/// construction, so `get()` after construction returns the seed exactly:
/// the `1/(1-accum)` correction cancels the first step's `(1-decay)`
/// attenuation. A new average is built at the start of every scale; values
/// are never blended across resolutions.
#[derive(Debug, Clone)]
pub struct RunningAverage {
    value: Tensor,
    decay: f32,
    accum: f32,
}

impl RunningAverage {
    pub fn new(seed: &Tensor, decay: f32) -> Self {
        debug_assert!((0.0..1.0).contains(&decay));
        let (c, h, w) = seed.shape();
        let mut avg = Self {
            value: Tensor::zeros(c, h, w),
            decay,
            accum: 1.0,
        };
        avg.update(seed);
        avg
    }

    pub fn update(&mut self, input: &Tensor) {
        assert_eq!(self.value.shape(), input.shape());
        self.accum *= self.decay;
        let d = self.decay;
        for (v, &x) in self.value.data_mut().iter_mut().zip(input.data()) {
            *v = *v * d + (1.0 - d) * x;
        }
    }

    /// Bias-corrected current average.
    pub fn get(&self) -> Tensor {
        let scale = 1.0 / (1.0 - self.accum);
        let mut out = self.value.clone();
        for v in out.data_mut() {
            *v *= scale;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_first_update_is_exact() {
        let x = Tensor::from_data(1, 1, 3, vec![0.2, 0.5, 0.9]);
        for decay in [0.5, 0.9, 0.99] {
            let avg = RunningAverage::new(&x, decay);
            let got = avg.get();
            for (a, b) in got.data().iter().zip(x.data()) {
                assert_relative_eq!(a, b, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_converges_to_constant_input() {
        let x = Tensor::full(1, 2, 2, 0.7);
        let mut avg = RunningAverage::new(&x, 0.9);
        for _ in 0..50 {
            avg.update(&x);
        }
        for &v in avg.get().data() {
            assert_relative_eq!(v, 0.7, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_two_updates_weighting() {
        // value = d(1-d)x1 + (1-d)x2, accum = d^2;
        // get = ((1-d)(d x1 + x2)) / (1 - d^2) = (d x1 + x2) / (1 + d)
        let x1 = Tensor::from_data(1, 1, 1, vec![1.0]);
        let x2 = Tensor::from_data(1, 1, 1, vec![0.0]);
        let d = 0.9f32;
        let mut avg = RunningAverage::new(&x1, d);
        avg.update(&x2);
        assert_relative_eq!(avg.get().data()[0], d / (1.0 + d), epsilon = 1e-6);
    }
}
