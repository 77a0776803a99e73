//! Deterministic synthetic extractor weights for unit tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::WeightStore;

/// Build a weight store holding He-initialized conv parameters for every
/// feature-stack convolution at index ≤ `max_layer`, seeded so tests are
/// reproducible. Magnitudes are scaled so activations stay O(1) through
/// the ReLU stack.
pub fn synthetic_vgg_weights(max_layer: usize, seed: u64) -> WeightStore {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut store = WeightStore::default();

    let blocks: [(usize, usize); 5] = [(2, 64), (2, 128), (4, 256), (4, 512), (4, 512)];
    let mut idx = 0usize;
    let mut in_channels = 3usize;
    'outer: for (convs, width) in blocks {
        for _ in 0..convs {
            if idx > max_layer {
                break 'outer;
            }
            let std = (2.0 / (in_channels as f32 * 9.0)).sqrt();
            let weight: Vec<f32> = (0..width * in_channels * 9)
                .map(|_| (rng.gen::<f32>() * 2.0 - 1.0) * std)
                .collect();
            store.insert(format!("features.{idx}.weight"), vec![width, in_channels, 3, 3], weight);
            store.insert(format!("features.{idx}.bias"), vec![width], vec![0.0; width]);
            in_channels = width;
            idx += 2; // conv + relu
        }
        idx += 1; // pool
    }
    store
}
