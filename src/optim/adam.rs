//! Adam optimizer over the working image.
//!
//! The image itself is the optimized parameter; the moment estimates are
//! image-shaped tensors. Across scale changes the state is warm-started by
//! resampling it to the new resolution rather than reset: first moments
//! are signed directions and follow the image's own bicubic resampling,
//! while second moments (and the AMSGrad running maximum) are magnitudes,
//! resampled bilinearly and clamped non-negative; stale magnitudes from a
//! different spatial density would otherwise corrupt the step sizing.

use crate::core::{resample, Tensor};
use crate::optim::{ImageOptimizer, LossClosure};

pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    amsgrad: bool,
    t: u32,
    m: Option<Tensor>,
    v: Option<Tensor>,
    v_max: Option<Tensor>,
}

impl Adam {
    pub fn new(lr: f32, beta1: f32, beta2: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            eps: 1e-8,
            amsgrad: false,
            t: 0,
            m: None,
            v: None,
            v_max: None,
        }
    }

    pub fn amsgrad(mut self, on: bool) -> Self {
        self.amsgrad = on;
        self
    }

    pub fn timestep(&self) -> u32 {
        self.t
    }

    fn ensure_state(&mut self, shape: (usize, usize, usize)) {
        let (c, h, w) = shape;
        let fits = self.m.as_ref().is_some_and(|m| m.shape() == shape);
        if !fits {
            self.m = Some(Tensor::zeros(c, h, w));
            self.v = Some(Tensor::zeros(c, h, w));
            if self.amsgrad {
                self.v_max = Some(Tensor::zeros(c, h, w));
            }
        }
    }

    /// Resample the moment state to a new resolution, preserving the
    /// timestep. Call between scales, before the first step at the new
    /// size.
    pub fn resize_state(&mut self, width: usize, height: usize) {
        if let Some(m) = self.m.take() {
            self.m = Some(resample::resize_bicubic(&m, width, height));
        }
        if let Some(v) = self.v.take() {
            let mut v = resample::resize_bilinear(&v, width, height);
            for x in v.data_mut() {
                *x = x.max(0.0);
            }
            self.v = Some(v);
        }
        if let Some(vm) = self.v_max.take() {
            let mut vm = resample::resize_bilinear(&vm, width, height);
            for x in vm.data_mut() {
                *x = x.max(0.0);
            }
            self.v_max = Some(vm);
        }
    }

    #[cfg(test)]
    fn second_moment(&self) -> Option<&Tensor> {
        self.v.as_ref()
    }
}

impl ImageOptimizer for Adam {
    fn step(&mut self, image: &mut Tensor, closure: &mut LossClosure) -> f32 {
        let (loss, grad) = closure(image);
        self.ensure_state(image.shape());

        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);
        let m = self.m.as_mut().expect("state ensured");
        let v = self.v.as_mut().expect("state ensured");

        for i in 0..image.len() {
            let g = grad.data()[i];
            let mi = m.data()[i] * self.beta1 + g * (1.0 - self.beta1);
            let vi = v.data()[i] * self.beta2 + g * g * (1.0 - self.beta2);
            m.data_mut()[i] = mi;
            v.data_mut()[i] = vi;

            let denom_v = if self.amsgrad {
                let vm = self.v_max.as_mut().expect("state ensured");
                let vmi = vm.data()[i].max(vi);
                vm.data_mut()[i] = vmi;
                vmi
            } else {
                vi
            };

            let m_hat = mi / bias1;
            let v_hat = denom_v / bias2;
            image.data_mut()[i] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
        loss
    }

    fn clamps_image(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quadratic_closure(target: f32) -> impl FnMut(&Tensor) -> (f32, Tensor) {
        move |x: &Tensor| {
            let mut grad = Tensor::zeros(x.channels(), x.height(), x.width());
            let mut loss = 0.0;
            for (i, &v) in x.data().iter().enumerate() {
                let d = v - target;
                loss += d * d;
                grad.data_mut()[i] = 2.0 * d;
            }
            (loss, grad)
        }
    }

    #[test]
    fn test_step_moves_against_gradient() {
        let mut opt = Adam::new(0.01, 0.9, 0.99);
        let mut image = Tensor::full(3, 2, 2, 0.8);
        let mut closure = quadratic_closure(0.2);
        let l0 = opt.step(&mut image, &mut closure);
        for &v in image.data() {
            assert!(v < 0.8);
        }
        let l1 = opt.step(&mut image, &mut closure);
        assert!(l1 < l0);
    }

    #[test]
    fn test_first_step_magnitude_is_lr() {
        // With bias correction, the first Adam step is ±lr (up to eps).
        let mut opt = Adam::new(0.02, 0.9, 0.99);
        let mut image = Tensor::full(1, 1, 1, 1.0);
        opt.step(&mut image, &mut quadratic_closure(0.0));
        assert_relative_eq!(image.data()[0], 1.0 - 0.02, epsilon = 1e-4);
    }

    #[test]
    fn test_resize_state_preserves_timestep_and_shape() {
        let mut opt = Adam::new(0.01, 0.9, 0.99);
        let mut image = Tensor::full(3, 4, 4, 0.5);
        let mut closure = quadratic_closure(0.0);
        opt.step(&mut image, &mut closure);
        opt.step(&mut image, &mut closure);
        assert_eq!(opt.timestep(), 2);

        opt.resize_state(8, 6);
        assert_eq!(opt.timestep(), 2);
        assert_eq!(opt.second_moment().unwrap().shape(), (3, 6, 8));
        for &x in opt.second_moment().unwrap().data() {
            assert!(x >= 0.0, "second moment must stay non-negative");
        }

        // A step at the new size uses the resized state untouched.
        let mut big = Tensor::full(3, 6, 8, 0.5);
        opt.step(&mut big, &mut closure);
        assert_eq!(opt.timestep(), 3);
    }

    #[test]
    fn test_amsgrad_tracks_running_maximum() {
        let mut opt = Adam::new(0.01, 0.9, 0.99).amsgrad(true);
        let mut image = Tensor::full(1, 1, 1, 1.0);
        let mut closure = quadratic_closure(0.0);
        opt.step(&mut image, &mut closure);
        let vm1 = opt.v_max.as_ref().unwrap().data()[0];
        // Shrinking gradients cannot shrink the maximum.
        opt.step(&mut image, &mut closure);
        let vm2 = opt.v_max.as_ref().unwrap().data()[0];
        assert!(vm2 >= vm1);
    }
}
