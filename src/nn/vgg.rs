//! VGG-19 feature extractor.
//!
//! A frozen prefix of the torchvision VGG-19 `features` stack: 3×3
//! convolutions, ReLUs, and 2×2 poolings, with pretrained weights loaded
//! from a safetensors file. The extractor only ever produces activations;
//! no gradient flows into its parameters (the backward pass in
//! [`crate::diff`] computes input gradients exclusively).
//!
//! The pretrained checkpoint expects sRGB inputs in [0, 1], normalized by
//! the ImageNet statistics; the raw input is still returned under
//! [`LayerKey::Input`] for pixel-space regularizers.

use std::collections::BTreeMap;

use crate::core::Tensor;
use crate::error::{Error, Result};
use crate::io::WeightStore;
use crate::nn::layers::{normalize, Conv2d, Layer, Padding, Pool, PoolKind};

/// Layer indices whose activations the content loss matches (relu4_2).
pub const CONTENT_LAYERS: [usize; 1] = [22];
/// Layer indices whose statistics the style loss matches (relu{1..5}_1).
pub const STYLE_LAYERS: [usize; 5] = [1, 6, 11, 20, 29];

/// Indices of the pooling layers in the VGG-19 feature stack.
const POOL_LAYERS: [usize; 5] = [4, 9, 18, 27, 36];

/// Convolution widths per block.
const BLOCKS: [(usize, usize); 5] = [(2, 64), (2, 128), (4, 256), (4, 512), (4, 512)];

/// A compute device. Only the CPU kind exists in this build; the plan
/// machinery and count validation are kept so a second device slot remains
/// a configuration rather than a rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl Device {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "cpu" => Ok(Self::Cpu),
            other => Err(Error::Config(format!("unknown device '{other}'"))),
        }
    }
}

/// Pooling strategy for the extractor's pooling layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pooling {
    Max,
    Average,
    L2,
}

impl Pooling {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "max" => Ok(Self::Max),
            "average" => Ok(Self::Average),
            "l2" => Ok(Self::L2),
            other => Err(Error::Config(format!(
                "pooling must be one of 'max', 'average', 'l2', got '{other}'"
            ))),
        }
    }

    fn kind(self) -> PoolKind {
        match self {
            Pooling::Max => PoolKind::Max,
            Pooling::Average => PoolKind::Average,
            Pooling::L2 => PoolKind::L2,
        }
    }

    /// Output rescale preserving activation-magnitude parity with max
    /// pooling.
    fn scale(self) -> f32 {
        match self {
            Pooling::Max => 1.0,
            Pooling::Average => 2.0,
            Pooling::L2 => 0.78,
        }
    }
}

/// Addressable activations in a [`Features`] set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerKey {
    /// The raw (un-normalized) input image.
    Input,
    /// Activation after the given feature-stack layer.
    Layer(usize),
}

/// Activations produced by one forward pass.
#[derive(Debug, Clone)]
pub struct Features {
    input: Tensor,
    maps: BTreeMap<usize, Tensor>,
}

impl Features {
    pub fn get(&self, key: LayerKey) -> &Tensor {
        match key {
            LayerKey::Input => &self.input,
            LayerKey::Layer(i) => &self.maps[&i],
        }
    }

    pub fn layer(&self, i: usize) -> &Tensor {
        &self.maps[&i]
    }
}

/// Forward intermediates retained for the backward pass: `inputs[i]` is
/// the tensor fed to layer `i` (`inputs[0]` is the normalized image).
pub struct Tape {
    pub(crate) inputs: Vec<Tensor>,
}

/// The frozen feature extractor.
#[derive(Debug)]
pub struct VggFeatures {
    layers: Vec<Layer>,
    devices: Vec<Device>,
    record: Vec<usize>,
}

impl VggFeatures {
    /// Build the extractor prefix covering `layers`, with weights taken
    /// from `weights` (torchvision `features.{i}.weight` / `.bias` names)
    /// and the pooling layers swapped to `pooling`.
    ///
    /// `devices` must name one or two devices; with two, layers from index
    /// 5 onward run on the second.
    pub fn new(
        weights: &WeightStore,
        layers: &[usize],
        pooling: Pooling,
        devices: &[Device],
    ) -> Result<Self> {
        let mut record: Vec<usize> = layers.to_vec();
        record.sort_unstable();
        record.dedup();
        let last = *record
            .last()
            .ok_or_else(|| Error::Config("at least one layer must be requested".into()))?;

        let device_plan: BTreeMap<usize, Device> = match devices {
            [d0] => BTreeMap::from([(0, *d0)]),
            [d0, d1] => BTreeMap::from([(0, *d0), (5, *d1)]),
            _ => {
                return Err(Error::Config(format!(
                    "only 1 or 2 devices are supported, got {}",
                    devices.len()
                )))
            }
        };

        let mut stack = Vec::new();
        let mut in_channels = 3;
        for (convs, width) in BLOCKS {
            for _ in 0..convs {
                let idx = stack.len();
                let weight = weights.tensor(
                    &format!("features.{idx}.weight"),
                    &[width, in_channels, 3, 3],
                )?;
                let bias = weights.tensor(&format!("features.{idx}.bias"), &[width])?;
                // Replicate padding on the first conv reduces edge artifacts.
                let padding = if idx == 0 {
                    Padding::Replicate
                } else {
                    Padding::Zero
                };
                stack.push(Layer::Conv(Conv2d::new(
                    in_channels,
                    width,
                    padding,
                    weight.to_vec(),
                    bias.to_vec(),
                )));
                stack.push(Layer::Relu);
                in_channels = width;
                if stack.len() > last {
                    break;
                }
            }
            if stack.len() > last {
                break;
            }
            stack.push(Layer::Pool(Pool {
                kind: pooling.kind(),
                scale: pooling.scale(),
            }));
            if stack.len() > last {
                break;
            }
        }
        stack.truncate(last + 1);

        let mut layer_devices = Vec::with_capacity(stack.len());
        let mut current = device_plan[&0];
        for i in 0..stack.len() {
            if let Some(d) = device_plan.get(&i) {
                current = *d;
            }
            layer_devices.push(current);
        }

        Ok(Self {
            layers: stack,
            devices: layer_devices,
            record,
        })
    }

    /// Minimum short-side size an input must have for `layers` to be
    /// computable: each pooling layer at or before the deepest requested
    /// layer halves the resolution.
    pub fn min_size(layers: &[usize]) -> usize {
        let last = layers.iter().copied().max().unwrap_or(0);
        let mut min_size = 1;
        for pool in POOL_LAYERS {
            if last < pool {
                break;
            }
            min_size *= 2;
        }
        min_size
    }

    /// Devices the extractor runs on, one entry per layer.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device_for_layer(&self, key: LayerKey) -> Device {
        match key {
            LayerKey::Input => self.devices[0],
            LayerKey::Layer(i) => self.devices[i],
        }
    }

    pub(crate) fn layer_stack(&self) -> &[Layer] {
        &self.layers
    }

    fn check_size(&self, input: &Tensor, layers: &[usize]) -> Result<()> {
        let min_size = Self::min_size(layers);
        let (h, w) = (input.height(), input.width());
        if h.min(w) < min_size {
            return Err(Error::InputTooSmall {
                width: w,
                height: h,
                min_size,
            });
        }
        Ok(())
    }

    /// Run the stack, returning activations for `layers` (or the layer set
    /// given at construction when `None`), plus the raw input.
    pub fn forward(&self, input: &Tensor, layers: Option<&[usize]>) -> Result<Features> {
        Ok(self.run(input, layers, false)?.0)
    }

    /// As [`forward`](Self::forward) but also retains every layer input so
    /// [`crate::diff::backprop_to_image`] can run afterwards.
    pub fn forward_tape(
        &self,
        input: &Tensor,
        layers: Option<&[usize]>,
    ) -> Result<(Features, Tape)> {
        let (feats, tape) = self.run(input, layers, true)?;
        Ok((feats, tape.expect("tape requested")))
    }

    fn run(
        &self,
        input: &Tensor,
        layers: Option<&[usize]>,
        keep_tape: bool,
    ) -> Result<(Features, Option<Tape>)> {
        let requested: Vec<usize> = match layers {
            Some(l) => {
                let mut l = l.to_vec();
                l.sort_unstable();
                l.dedup();
                l
            }
            None => self.record.clone(),
        };
        self.check_size(input, &requested)?;
        let last = *requested.last().expect("non-empty layer set");
        assert!(last < self.layers.len(), "layer {last} beyond built stack");

        let mut maps = BTreeMap::new();
        let mut tape_inputs = Vec::new();
        let mut x = normalize(input);
        for (i, layer) in self.layers[..=last].iter().enumerate() {
            if keep_tape {
                tape_inputs.push(x.clone());
            }
            x = layer.forward(&x);
            if requested.binary_search(&i).is_ok() {
                maps.insert(i, x.clone());
            }
        }

        let feats = Features {
            input: input.clone(),
            maps,
        };
        let tape = keep_tape.then_some(Tape { inputs: tape_inputs });
        Ok((feats, tape))
    }
}
