//! L-BFGS optimizer over the working image.
//!
//! A limited-memory quasi-Newton method: curvature pairs from recent
//! steps approximate the inverse Hessian via the two-loop recursion. One
//! inner iteration per [`step`](crate::optim::ImageOptimizer::step) call,
//! no line search; the first step is scaled by `min(1, 1/‖g‖₁)` so the
//! initial steepest-descent move is bounded regardless of gradient scale.
//!
//! Unlike Adam, this optimizer carries no resolution-keyed state worth
//! resampling; it is reconstructed fresh at every scale, and the engine
//! must not clamp the image between its steps (clamping invalidates the
//! curvature pairs).

use std::collections::VecDeque;

use crate::core::Tensor;
use crate::optim::{ImageOptimizer, LossClosure};

const TOLERANCE_GRAD: f32 = 1e-7;
const TOLERANCE_CHANGE: f32 = 1e-9;

pub struct Lbfgs {
    lr: f32,
    history_size: usize,
    /// (y, s, 1/y·s) curvature pairs, oldest first.
    history: VecDeque<(Vec<f32>, Vec<f32>, f32)>,
    h_diag: f32,
    prev_grad: Option<Vec<f32>>,
    prev_dir: Option<Vec<f32>>,
    prev_step: f32,
    n_iter: u32,
}

impl Lbfgs {
    pub fn new(lr: f32, history_size: usize) -> Self {
        Self {
            lr,
            history_size,
            history: VecDeque::new(),
            h_diag: 1.0,
            prev_grad: None,
            prev_dir: None,
            prev_step: 0.0,
            n_iter: 0,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl ImageOptimizer for Lbfgs {
    fn step(&mut self, image: &mut Tensor, closure: &mut LossClosure) -> f32 {
        let (loss, grad) = closure(image);
        let g = grad.data().to_vec();

        if g.iter().fold(0.0f32, |m, x| m.max(x.abs())) <= TOLERANCE_GRAD {
            return loss;
        }
        self.n_iter += 1;

        let direction = if let (Some(prev_g), Some(prev_d)) =
            (self.prev_grad.as_ref(), self.prev_dir.as_ref())
        {
            // Fold the last step into the curvature history.
            let y: Vec<f32> = g.iter().zip(prev_g).map(|(a, b)| a - b).collect();
            let s: Vec<f32> = prev_d.iter().map(|d| d * self.prev_step).collect();
            let ys = dot(&y, &s);
            if ys > 1e-10 {
                if self.history.len() == self.history_size {
                    self.history.pop_front();
                }
                self.h_diag = ys / dot(&y, &y);
                self.history.push_back((y, s, 1.0 / ys));
            }

            // Two-loop recursion.
            let mut q: Vec<f32> = g.iter().map(|x| -x).collect();
            let mut alphas = vec![0.0f32; self.history.len()];
            for (i, (y, s, ro)) in self.history.iter().enumerate().rev() {
                let a = dot(s, &q) * ro;
                alphas[i] = a;
                for (qj, yj) in q.iter_mut().zip(y) {
                    *qj -= a * yj;
                }
            }
            let mut d: Vec<f32> = q.iter().map(|x| x * self.h_diag).collect();
            for (i, (y, s, ro)) in self.history.iter().enumerate() {
                let beta = dot(y, &d) * ro;
                let a = alphas[i];
                for (dj, sj) in d.iter_mut().zip(s) {
                    *dj += (a - beta) * sj;
                }
            }
            d
        } else {
            g.iter().map(|x| -x).collect()
        };

        let t = if self.n_iter == 1 {
            let l1: f32 = g.iter().map(|x| x.abs()).sum();
            (1.0f32).min(1.0 / l1) * self.lr
        } else {
            self.lr
        };

        let gtd = dot(&g, &direction);
        self.prev_grad = Some(g);
        if gtd > -TOLERANCE_CHANGE {
            // Not a descent direction; keep the iterate.
            self.prev_dir = Some(direction);
            self.prev_step = 0.0;
            return loss;
        }

        for (x, d) in image.data_mut().iter_mut().zip(&direction) {
            *x += t * d;
        }
        self.prev_dir = Some(direction);
        self.prev_step = t;
        loss
    }

    fn clamps_image(&self) -> bool {
        false
    }
}
