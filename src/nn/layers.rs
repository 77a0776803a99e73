//! Forward kernels for the feature extractor's layer types.
//!
//! All convolutions are 3×3, stride 1, padding 1 (output size preserved);
//! all poolings are 2×2, stride 2 (floor). Backward passes live in
//! [`crate::diff`].

use rayon::prelude::*;

use crate::core::Tensor;

/// ImageNet channel means the pretrained network was trained against.
pub const NORMALIZE_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations.
pub const NORMALIZE_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Spatial padding behavior for convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    Zero,
    /// Edge pixels are repeated outward. Used for the first convolution to
    /// reduce border artifacts in the synthesized image.
    Replicate,
}

/// A 3×3 convolution with frozen weights.
#[derive(Debug, Clone)]
pub struct Conv2d {
    pub in_channels: usize,
    pub out_channels: usize,
    pub padding: Padding,
    /// `[out][in][ky][kx]`, row-major.
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl Conv2d {
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        padding: Padding,
        weight: Vec<f32>,
        bias: Vec<f32>,
    ) -> Self {
        assert_eq!(weight.len(), out_channels * in_channels * 9);
        assert_eq!(bias.len(), out_channels);
        Self {
            in_channels,
            out_channels,
            padding,
            weight,
            bias,
        }
    }

    #[inline]
    pub(crate) fn weight(&self, co: usize, ci: usize, ky: usize, kx: usize) -> f32 {
        self.weight[((co * self.in_channels + ci) * 3 + ky) * 3 + kx]
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        assert_eq!(input.channels(), self.in_channels);
        let (h, w) = (input.height(), input.width());
        let plane = h * w;

        let planes: Vec<Vec<f32>> = (0..self.out_channels)
            .into_par_iter()
            .map(|co| {
                let mut out = vec![self.bias[co]; plane];
                for ci in 0..self.in_channels {
                    let src = input.channel(ci);
                    for ky in 0..3usize {
                        for kx in 0..3usize {
                            let wgt = self.weight(co, ci, ky, kx);
                            if wgt == 0.0 {
                                continue;
                            }
                            accumulate_shifted(
                                &mut out,
                                src,
                                h,
                                w,
                                ky as isize - 1,
                                kx as isize - 1,
                                wgt,
                                self.padding,
                            );
                        }
                    }
                }
                out
            })
            .collect();

        let mut data = Vec::with_capacity(self.out_channels * plane);
        for p in planes {
            data.extend_from_slice(&p);
        }
        Tensor::from_data(self.out_channels, h, w, data)
    }
}

/// `out[y][x] += weight * src[y+dy][x+dx]` with the given padding behavior
/// at the borders.
#[inline]
fn accumulate_shifted(
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
        let sy = y + dy;
        let sy = match padding {
            Padding::Zero => {
                if sy < 0 || sy >= h as isize {
                    continue;
                }
                sy
            }
            Padding::Replicate => sy.clamp(0, h as isize - 1),
        };
        let row_out = y as usize * w;
        let row_src = sy as usize * w;
        for x in 0..w as isize {
            let sx = x + dx;
            let sx = match padding {
                Padding::Zero => {
                    if sx < 0 || sx >= w as isize {
                        continue;
                    }
                    sx
                }
                Padding::Replicate => sx.clamp(0, w as isize - 1),
            };
            out[row_out + x as usize] += weight * src[row_src + sx as usize];
        }
    }
}

/// Pooling operator over 2×2 windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Average,
    /// `sqrt(Σ x²)` over the window (p=2 power-average pooling).
    L2,
}

/// 2×2 stride-2 pooling with an output rescale.
///
/// The rescale keeps average/L2 pooling activation magnitudes in the same
/// regime as max pooling, since the style statistics downstream are
/// sensitive to the pooling type.
#[derive(Debug, Clone, Copy)]
pub struct Pool {
    pub kind: PoolKind,
    pub scale: f32,
}

impl Pool {
    pub fn forward(&self, input: &Tensor) -> Tensor {
        let (c, h, w) = input.shape();
        let (oh, ow) = (h / 2, w / 2);
        let mut out = Tensor::zeros(c, oh, ow);
        for ch in 0..c {
            let src = input.channel(ch);
            let dst = out.channel_mut(ch);
            for y in 0..oh {
                for x in 0..ow {
                    let i00 = (2 * y) * w + 2 * x;
                    let i01 = i00 + 1;
                    let i10 = i00 + w;
                    let i11 = i10 + 1;
                    let v = match self.kind {
                        PoolKind::Max => src[i00].max(src[i01]).max(src[i10]).max(src[i11]),
                        PoolKind::Average => 0.25 * (src[i00] + src[i01] + src[i10] + src[i11]),
                        PoolKind::L2 => (src[i00] * src[i00]
                            + src[i01] * src[i01]
                            + src[i10] * src[i10]
                            + src[i11] * src[i11])
                            .sqrt(),
                    };
                    dst[y * ow + x] = v * self.scale;
                }
            }
        }
        out
    }
}

/// Per-channel ImageNet normalization applied between the recorded raw
/// input and the first convolution.
pub fn normalize(input: &Tensor) -> Tensor {
    assert_eq!(input.channels(), 3);
    let mut out = input.clone();
    for c in 0..3 {
        let mean = NORMALIZE_MEAN[c];
        let inv_std = 1.0 / NORMALIZE_STD[c];
        for v in out.channel_mut(c) {
            *v = (*v - mean) * inv_std;
        }
    }
    out
}

/// ReLU.
pub fn relu(input: &Tensor) -> Tensor {
    let mut out = input.clone();
    for v in out.data_mut() {
        *v = v.max(0.0);
    }
    out
}

/// One layer of the feature extractor.
#[derive(Debug, Clone)]
pub enum Layer {
    Conv(Conv2d),
    Relu,
    Pool(Pool),
}

impl Layer {
    pub fn forward(&self, input: &Tensor) -> Tensor {
        match self {
            Layer::Conv(conv) => conv.forward(input),
            Layer::Relu => relu(input),
            Layer::Pool(pool) => pool.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn identity_conv(channels: usize) -> Conv2d {
        let mut weight = vec![0.0; channels * channels * 9];
        for c in 0..channels {
            // center tap of channel c -> c
            weight[((c * channels + c) * 3 + 1) * 3 + 1] = 1.0;
        }
        Conv2d::new(channels, channels, Padding::Zero, weight, vec![0.0; channels])
    }

    #[test]
    fn test_identity_conv_preserves_input() {
        let input = Tensor::from_data(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let out = identity_conv(1).forward(&input);
        assert_eq!(out, input);
    }

    #[test]
    fn test_conv_bias_only() {
        let conv = Conv2d::new(1, 2, Padding::Zero, vec![0.0; 18], vec![0.5, -0.5]);
        let out = conv.forward(&Tensor::zeros(1, 3, 3));
        assert_relative_eq!(out.at(0, 1, 1), 0.5);
        assert_relative_eq!(out.at(1, 2, 2), -0.5);
    }

    #[test]
    fn test_conv_zero_vs_replicate_padding_at_border() {
        // Kernel that reads only the upper-left neighbor.
        let mut weight = vec![0.0; 9];
        weight[0] = 1.0;
        let zero = Conv2d::new(1, 1, Padding::Zero, weight.clone(), vec![0.0]);
        let repl = Conv2d::new(1, 1, Padding::Replicate, weight, vec![0.0]);
        let input = Tensor::from_data(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        // At (0,0) the upper-left neighbor is out of bounds.
        assert_relative_eq!(zero.forward(&input).at(0, 0, 0), 0.0);
        assert_relative_eq!(repl.forward(&input).at(0, 0, 0), 1.0);
        // Interior: both read input(0,0).
        assert_relative_eq!(zero.forward(&input).at(0, 1, 1), 1.0);
        assert_relative_eq!(repl.forward(&input).at(0, 1, 1), 1.0);
    }

    #[test]
    fn test_pool_kinds() {
        let input = Tensor::from_data(1, 2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let max = Pool {
            kind: PoolKind::Max,
            scale: 1.0,
        };
        assert_relative_eq!(max.forward(&input).at(0, 0, 0), 4.0);
        let avg = Pool {
            kind: PoolKind::Average,
            scale: 2.0,
        };
        assert_relative_eq!(avg.forward(&input).at(0, 0, 0), 5.0);
        let l2 = Pool {
            kind: PoolKind::L2,
            scale: 1.0,
        };
        assert_relative_eq!(l2.forward(&input).at(0, 0, 0), 30.0f32.sqrt());
    }

    #[test]
    fn test_pool_floor_division_drops_odd_edge() {
        let input = Tensor::from_data(1, 3, 3, (1..=9).map(|v| v as f32).collect());
        let pool = Pool {
            kind: PoolKind::Max,
            scale: 1.0,
        };
        let out = pool.forward(&input);
        assert_eq!(out.shape(), (1, 1, 1));
        // window covers values 1,2,4,5
        assert_relative_eq!(out.at(0, 0, 0), 5.0);
    }

    #[test]
    fn test_normalize_matches_formula() {
        let input = Tensor::full(3, 1, 1, 0.485);
        let out = normalize(&input);
        assert_relative_eq!(out.at(0, 0, 0), 0.0, epsilon = 1e-6);
        assert_relative_eq!(
            out.at(1, 0, 0),
            (0.485 - 0.456) / 0.224,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_relu() {
        let out = relu(&Tensor::from_data(1, 1, 3, vec![-1.0, 0.0, 2.0]));
        assert_eq!(out.data(), &[0.0, 0.0, 2.0]);
    }
}
