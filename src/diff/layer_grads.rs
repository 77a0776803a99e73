//! Input-gradient kernels for each layer type.
//!
//! Each function is the adjoint of the matching forward kernel in
//! [`crate::nn::layers`]. The extractor's weights are frozen, so only
//! gradients with respect to layer *inputs* exist.

use rayon::prelude::*;

use crate::core::Tensor;
use crate::nn::layers::{Conv2d, Padding, Pool, PoolKind, NORMALIZE_STD};

/// `out[y+dy][x+dx] += weight * src[y][x]`, the adjoint of the shifted
/// read in the convolution forward. Replicate padding clamps the target
/// the same way the forward clamped the source.
#[inline]
fn scatter_shifted(
    out: &mut [f32],
    src: &[f32],
    h: usize,
    w: usize,
    dy: isize,
    dx: isize,
    weight: f32,
    padding: Padding,
) {
    for y in 0..h as isize {
        let ty = y + dy;
        let ty = match padding {
            Padding::Zero => {
                if ty < 0 || ty >= h as isize {
                    continue;
                }
                ty
            }
            Padding::Replicate => ty.clamp(0, h as isize - 1),
        };
        let row_src = y as usize * w;
        let row_out = ty as usize * w;
        for x in 0..w as isize {
            let tx = x + dx;
            let tx = match padding {
                Padding::Zero => {
                    if tx < 0 || tx >= w as isize {
                        continue;
                    }
                    tx
                }
                Padding::Replicate => tx.clamp(0, w as isize - 1),
            };
            out[row_out + tx as usize] += weight * src[row_src + x as usize];
        }
    }
}

/// Gradient of a convolution with respect to its input.
pub fn conv2d_input_grad(conv: &Conv2d, grad_out: &Tensor) -> Tensor {
    assert_eq!(grad_out.channels(), conv.out_channels);
    let (h, w) = (grad_out.height(), grad_out.width());

    let planes: Vec<Vec<f32>> = (0..conv.in_channels)
        .into_par_iter()
        .map(|ci| {
            let mut gin = vec![0.0f32; h * w];
            for co in 0..conv.out_channels {
                let g = grad_out.channel(co);
                for ky in 0..3usize {
                    for kx in 0..3usize {
                        let wgt = conv.weight(co, ci, ky, kx);
                        if wgt == 0.0 {
                            continue;
                        }
                        scatter_shifted(
                            &mut gin,
                            g,
                            h,
                            w,
                            ky as isize - 1,
                            kx as isize - 1,
                            wgt,
                            conv.padding,
                        );
                    }
                }
            }
            gin
        })
        .collect();

    let mut data = Vec::with_capacity(conv.in_channels * h * w);
    for p in planes {
        data.extend_from_slice(&p);
    }
    Tensor::from_data(conv.in_channels, h, w, data)
}

/// Gradient of ReLU: pass-through where the forward input was positive.
pub fn relu_grad(input: &Tensor, grad_out: &Tensor) -> Tensor {
    assert_eq!(input.shape(), grad_out.shape());
    let mut gin = grad_out.clone();
    for (g, &x) in gin.data_mut().iter_mut().zip(input.data()) {
        if x <= 0.0 {
            *g = 0.0;
        }
    }
    gin
}

/// Gradient of 2×2 stride-2 pooling. Rows/columns dropped by the floor
/// division receive zero gradient.
pub fn pool_grad(pool: &Pool, input: &Tensor, grad_out: &Tensor) -> Tensor {
    let (c, h, w) = input.shape();
    let (oh, ow) = (h / 2, w / 2);
    assert_eq!(grad_out.shape(), (c, oh, ow));

    let mut gin = Tensor::zeros(c, h, w);
    for ch in 0..c {
        let src = input.channel(ch);
        let g = grad_out.channel(ch);
        let dst = gin.channel_mut(ch);
        for y in 0..oh {
            for x in 0..ow {
                let idx = [
                    (2 * y) * w + 2 * x,
                    (2 * y) * w + 2 * x + 1,
                    (2 * y + 1) * w + 2 * x,
                    (2 * y + 1) * w + 2 * x + 1,
                ];
                let go = g[y * ow + x] * pool.scale;
                match pool.kind {
                    PoolKind::Max => {
                        let mut best = idx[0];
                        for &i in &idx[1..] {
                            if src[i] > src[best] {
                                best = i;
                            }
                        }
                        dst[best] += go;
                    }
                    PoolKind::Average => {
                        for &i in &idx {
                            dst[i] += 0.25 * go;
                        }
                    }
                    PoolKind::L2 => {
                        let raw = (idx.iter().map(|&i| src[i] * src[i]).sum::<f32>()).sqrt();
                        if raw > 0.0 {
                            for &i in &idx {
                                dst[i] += go * src[i] / raw;
                            }
                        }
                    }
                }
            }
        }
    }
    gin
}

/// Gradient of the per-channel input normalization.
pub fn normalize_grad(grad_out: &Tensor) -> Tensor {
    assert_eq!(grad_out.channels(), 3);
    let mut gin = grad_out.clone();
    for c in 0..3 {
        let inv_std = 1.0 / NORMALIZE_STD[c];
        for g in gin.channel_mut(c) {
            *g *= inv_std;
        }
    }
    gin
}
