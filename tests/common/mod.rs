//! Shared fixtures for integration tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use pastiche::{Tensor, WeightStore};

/// Deterministic He-initialized weights for every feature-stack conv at
/// index ≤ `max_layer`, so tests never need a real checkpoint on disk.
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
            store.insert(
                format!("features.{idx}.weight"),
                vec![width, in_channels, 3, 3],
                weight,
            );
            store.insert(format!("features.{idx}.bias"), vec![width], vec![0.0; width]);
            in_channels = width;
            idx += 2; // conv + relu
        }
        idx += 1; // pool
    }
    store
}

/// A small deterministic test image with smooth gradients and a block of
/// structure, values in [0, 1].
pub fn test_image(width: usize, height: usize, seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut t = Tensor::zeros(3, height, width);
    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let ramp = (x as f32 / width as f32 + y as f32 / height as f32) / 2.0;
                let noise = rng.gen::<f32>() * 0.2;
                t.set(c, y, x, (ramp * 0.8 + noise).clamp(0.0, 1.0));
            }
        }
    }
    t
}
