//! The stylization engine: scale schedule, per-scale target building,
//! optimization loop, and running-average commit.

use std::collections::BTreeMap;
use std::time::SystemTime;

use tracing::info;

use crate::core::{gen_scales, init_image, normalize_weights, size_to_fit, resample, Init, Tensor};
use crate::diff;
use crate::ema::RunningAverage;
use crate::error::{Error, Result};
use crate::io::{self, Rgb16Image, WeightStore};
use crate::loss::{ContentLossMse, MomentStats, StyleLossW2, SumLoss, Term, VBetaLoss};
use crate::nn::{Device, LayerKey, Pooling, VggFeatures, CONTENT_LAYERS, STYLE_LAYERS};
use crate::optim::{Adam, ImageOptimizer, Lbfgs, OptimizerKind};

use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Relative weighting of the style layers, coarsest-feature layer first.
/// This is a fixed internal schedule over *layers*; the user-supplied
/// per-style-*image* weights are a separate axis.
const STYLE_LAYER_WEIGHTS: [f32; 5] = [256.0, 64.0, 16.0, 4.0, 1.0];

/// One progress record per optimizer iteration.
#[derive(Debug, Clone)]
pub struct Iterate {
    pub width: usize,
    pub height: usize,
    /// 1-based iteration index within the current scale.
    pub iteration: u32,
    /// Iteration budget for the current scale.
    pub iteration_count: u32,
    pub loss: f32,
    pub time: SystemTime,
    /// Peak device memory in bytes; 0 when not applicable (CPU).
    pub peak_memory: u64,
}

/// Options for one [`StyleTransfer::stylize`] run.
#[derive(Debug, Clone)]
pub struct StylizeOptions {
    /// Per-style-image weights; uniform when `None`. Renormalized so the
    /// absolute values sum to 1.
    pub style_weights: Option<Vec<f32>>,
    pub content_weight: f32,
    pub tv_weight: f32,
    pub tv_beta: f32,
    pub optimizer: OptimizerKind,
    pub min_scale: u32,
    pub end_scale: u32,
    /// Iteration budget per scale after the first.
    pub iterations: u32,
    /// Iteration budget for the coarsest scale, which starts from
    /// scratch and needs the larger share of the work.
    pub initial_iterations: u32,
    pub step_size: f32,
    pub avg_decay: f32,
    pub init: Init,
    /// Style images are resized to `scale * style_scale_fac` per scale…
    pub style_scale_fac: f32,
    /// …unless this fixed override is set.
    pub style_size: Option<u32>,
    /// Log each loss term's value per evaluation.
    pub verbose: bool,
}

impl Default for StylizeOptions {
    fn default() -> Self {
        Self {
            style_weights: None,
            content_weight: 0.015,
            tv_weight: 0.125,
            tv_beta: 2.0,
            optimizer: OptimizerKind::Adam,
            min_scale: 128,
            end_scale: 512,
            iterations: 500,
            initial_iterations: 1000,
            step_size: 0.02,
            avg_decay: 0.99,
            init: Init::Content,
            style_scale_fac: 1.0,
            style_size: None,
            verbose: false,
        }
    }
}

/// Rendered output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Standard 8-bit RGB.
    Rgb8,
    /// 16-bit RGB for further editing.
    Rgb16,
}

impl OutputFormat {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "rgb8" => Ok(Self::Rgb8),
            "rgb16" => Ok(Self::Rgb16),
            other => Err(Error::Config(format!(
                "output format must be one of 'rgb8', 'rgb16', got '{other}'"
            ))),
        }
    }
}

/// A rendered output image.
pub enum RenderedImage {
    Rgb8(RgbImage),
    Rgb16(Rgb16Image),
}

enum ScaleOptimizer {
    Adam(Adam),
    Lbfgs(Lbfgs),
}

impl ScaleOptimizer {
    fn as_dyn(&mut self) -> &mut dyn ImageOptimizer {
        match self {
            ScaleOptimizer::Adam(a) => a,
            ScaleOptimizer::Lbfgs(l) => l,
        }
    }
}

/// The stylization engine.
///
/// Owns the working image and running average exclusively for the
/// duration of a run; callers only ever receive copies.
#[derive(Debug)]
pub struct StyleTransfer {
    model: VggFeatures,
    devices: Vec<Device>,
    content_layers: Vec<usize>,
    style_layers: Vec<usize>,
    style_layer_weights: Vec<f32>,
    image: Option<Tensor>,
    average: Option<RunningAverage>,
}

impl StyleTransfer {
    /// Build an engine on the given devices (1 or 2) with the given
    /// pooling strategy. The device count is validated before any model
    /// weights are touched.
    pub fn new(weights: &WeightStore, devices: &[Device], pooling: Pooling) -> Result<Self> {
        if devices.is_empty() || devices.len() > 2 {
            return Err(Error::Config(format!(
                "only 1 or 2 devices are supported, got {}",
                devices.len()
            )));
        }

        let content_layers = CONTENT_LAYERS.to_vec();
        let style_layers = STYLE_LAYERS.to_vec();
        let style_layer_weights = normalize_weights(&STYLE_LAYER_WEIGHTS);

        let mut all_layers = style_layers.clone();
        all_layers.extend_from_slice(&content_layers);
        let model = VggFeatures::new(weights, &all_layers, pooling, devices)?;

        Ok(Self {
            model,
            devices: devices.to_vec(),
            content_layers,
            style_layers,
            style_layer_weights,
            image: None,
            average: None,
        })
    }

    /// Detached snapshot of the current averaged iterate, clamped to
    /// [0, 1]. `None` before the first scale has started.
    pub fn image_tensor(&self) -> Option<Tensor> {
        self.average.as_ref().map(|avg| {
            let mut img = avg.get();
            img.clamp_in_place(0.0, 1.0);
            img
        })
    }

    /// Render the current averaged iterate in the requested format.
    pub fn get_image(&self, format: OutputFormat) -> Result<RenderedImage> {
        let img = self
            .image_tensor()
            .ok_or_else(|| Error::Config("no stylized image available yet".into()))?;
        Ok(match format {
            OutputFormat::Rgb8 => RenderedImage::Rgb8(io::tensor_to_rgb8(&img)),
            OutputFormat::Rgb16 => RenderedImage::Rgb16(io::tensor_to_rgb16(&img)),
        })
    }

    /// Synthesize an image with `content`'s structure and the styles'
    /// statistics. Returns the final averaged iterate, clamped to [0, 1].
    pub fn stylize(
        &mut self,
        content: &Tensor,
        styles: &[Tensor],
        options: &StylizeOptions,
        mut callback: Option<&mut dyn FnMut(&Iterate)>,
    ) -> Result<Tensor> {
        if styles.is_empty() {
            return Err(Error::Config("at least one style image is required".into()));
        }
        let style_weights = match &options.style_weights {
            None => vec![1.0 / styles.len() as f32; styles.len()],
            Some(w) => {
                if w.len() != styles.len() {
                    return Err(Error::Config(format!(
                        "got {} style weights for {} style images",
                        w.len(),
                        styles.len()
                    )));
                }
                normalize_weights(w)
            }
        };

        let min_scale = options.min_scale.min(options.end_scale);
        let scales = gen_scales(min_scale, options.end_scale);
        let content_size = (content.width() as u32, content.height() as u32);
        let content_term_weight = options.content_weight / self.content_layers.len() as f32;

        let mut rng = StdRng::from_entropy();
        let (cw, ch) = size_to_fit(content_size, scales[0], true);
        self.image = Some(init_image(
            options.init,
            content,
            styles,
            &style_weights,
            cw as usize,
            ch as usize,
            &mut rng,
        ));
        self.average = None;

        // Adam state survives scale changes (resampled); L-BFGS is
        // rebuilt from scratch each scale.
        let mut adam: Option<Adam> = None;

        for (scale_idx, &scale) in scales.iter().enumerate() {
            // PREPARE: resize the content and working image, rebuild the
            // loss against targets computed at this scale.
            let (cw, ch) = size_to_fit(content_size, scale, true);
            let (cw, ch) = (cw as usize, ch as usize);

            let min_size = VggFeatures::min_size(&self.style_layers)
                .max(VggFeatures::min_size(&self.content_layers));
            if cw.min(ch) < min_size {
                return Err(Error::InputTooSmall {
                    width: cw,
                    height: ch,
                    min_size,
                });
            }

            let mut content_scaled = resample::resize_bicubic(content, cw, ch);
            content_scaled.clamp_in_place(0.0, 1.0);

            let mut image = resample::resize_bicubic(
                self.image.as_ref().expect("image initialized above"),
                cw,
                ch,
            );
            image.clamp_in_place(0.0, 1.0);
            let mut average = RunningAverage::new(&image, options.avg_decay);

            info!(width = cw, height = ch, "processing content image");
            let content_feats = self
                .model
                .forward(&content_scaled, Some(&self.content_layers))?;
            let mut terms = Vec::new();
            for &layer in &self.content_layers {
                terms.push(Term::new(
                    format!("content:{layer}"),
                    LayerKey::Layer(layer),
                    content_term_weight,
                    self.model.device_for_layer(LayerKey::Layer(layer)),
                    Box::new(ContentLossMse::new(content_feats.layer(layer).clone())),
                ));
            }

            // Accumulate weighted (mean, srm) targets over style images;
            // both statistics are linear, so per-image weighting is just
            // a scaled sum.
            let mut style_targets: BTreeMap<usize, MomentStats> = BTreeMap::new();
            for (style, &weight) in styles.iter().zip(&style_weights) {
                let style_size = (style.width() as u32, style.height() as u32);
                let (sw, sh) = match options.style_size {
                    Some(fixed) => size_to_fit(style_size, fixed, false),
                    None => size_to_fit(
                        style_size,
                        (scale as f64 * options.style_scale_fac as f64).round() as u32,
                        false,
                    ),
                };
                let mut style_scaled =
                    resample::resize_bicubic(style, sw as usize, sh as usize);
                style_scaled.clamp_in_place(0.0, 1.0);
                info!(width = sw, height = sh, "processing style image");
                let style_feats = self
                    .model
                    .forward(&style_scaled, Some(&self.style_layers))?;
                for &layer in &self.style_layers {
                    let stats = MomentStats::from_activation(style_feats.layer(layer));
                    style_targets
                        .entry(layer)
                        .or_insert_with(|| MomentStats::zeros(stats.mean.len()))
                        .accumulate(&stats, weight);
                }
            }
            for (&layer, &weight) in self.style_layers.iter().zip(&self.style_layer_weights) {
                let target = &style_targets[&layer];
                terms.push(Term::new(
                    format!("style:{layer}"),
                    LayerKey::Layer(layer),
                    weight,
                    self.model.device_for_layer(LayerKey::Layer(layer)),
                    Box::new(StyleLossW2::new(target)),
                ));
            }

            // The regularizer comes last, so the composite sums on its
            // (pixel-space) device.
            terms.push(Term::new(
                "tv",
                LayerKey::Input,
                options.tv_weight,
                self.devices[0],
                Box::new(VBetaLoss::new(options.tv_beta)),
            ));
            let crit = SumLoss::new(terms).verbose(options.verbose);

            let mut opt = match options.optimizer {
                OptimizerKind::Adam => {
                    let mut a = adam
                        .take()
                        .unwrap_or_else(|| Adam::new(options.step_size, 0.9, 0.99));
                    a.resize_state(cw, ch);
                    ScaleOptimizer::Adam(a)
                }
                OptimizerKind::Lbfgs => ScaleOptimizer::Lbfgs(Lbfgs::new(1.0, 10)),
            };

            // OPTIMIZE: N steps of closure evaluation + in-place update.
            let model = &self.model;
            let mut closure = |img: &Tensor| -> (f32, Tensor) {
                let (feats, tape) = model
                    .forward_tape(img, None)
                    .expect("image size was validated for this scale");
                let eval = crit.eval(&feats);
                let grad = diff::backprop_to_image(
                    model,
                    &tape,
                    &eval.cotangents,
                    eval.input_cotangent.as_ref(),
                );
                (eval.value, grad)
            };

            let budget = if scale_idx == 0 {
                options.initial_iterations
            } else {
                options.iterations
            };
            for i in 1..=budget {
                let opt = opt.as_dyn();
                let loss = opt.step(&mut image, &mut closure);
                if opt.clamps_image() {
                    image.clamp_in_place(0.0, 1.0);
                }
                average.update(&image);
                if let Some(cb) = callback.as_mut() {
                    cb(&Iterate {
                        width: cw,
                        height: ch,
                        iteration: i,
                        iteration_count: budget,
                        loss,
                        time: SystemTime::now(),
                        peak_memory: 0,
                    });
                }
            }

            // COMMIT: the next scale starts from the smoothed iterate,
            // not the raw optimized image.
            self.image = Some(average.get());
            self.average = Some(average);
            if let ScaleOptimizer::Adam(a) = opt {
                adam = Some(a);
            }
        }

        Ok(self
            .image_tensor()
            .expect("at least one scale was processed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::test_weights::synthetic_vgg_weights;

    #[test]
    fn test_three_devices_is_config_error_before_model_load() {
        // An empty weight store would fail model construction; the device
        // check must fire first.
        let weights = WeightStore::default();
        let err = StyleTransfer::new(
            &weights,
            &[Device::Cpu, Device::Cpu, Device::Cpu],
            Pooling::Max,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_get_image_before_run() {
        let weights = synthetic_vgg_weights(29, 0);
        let engine = StyleTransfer::new(&weights, &[Device::Cpu], Pooling::Max).unwrap();
        assert!(engine.get_image(OutputFormat::Rgb8).is_err());
        assert!(engine.image_tensor().is_none());
    }

    #[test]
    fn test_mismatched_style_weights() {
        let weights = synthetic_vgg_weights(29, 0);
        let mut engine =
            StyleTransfer::new(&weights, &[Device::Cpu], Pooling::Max).unwrap();
        let content = Tensor::full(3, 32, 32, 0.5);
        let style = Tensor::full(3, 32, 32, 0.4);
        let options = StylizeOptions {
            style_weights: Some(vec![1.0, 2.0]),
            ..Default::default()
        };
        let err = engine
            .stylize(&content, &[style], &options, None)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_no_styles_is_config_error() {
        let weights = synthetic_vgg_weights(29, 0);
        let mut engine =
            StyleTransfer::new(&weights, &[Device::Cpu], Pooling::Max).unwrap();
        let content = Tensor::full(3, 32, 32, 0.5);
        let err = engine
            .stylize(&content, &[], &StylizeOptions::default(), None)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
