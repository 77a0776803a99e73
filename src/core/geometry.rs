//! Scale-schedule and sizing utilities.

/// Fit `(width, height)` inside a square of side `max_dim`, preserving
/// aspect ratio. When the image already fits and `scale_up` is false the
/// size is returned unchanged; otherwise the longest edge becomes exactly
/// `max_dim` and the short edge is rounded.
pub fn size_to_fit(size: (u32, u32), max_dim: u32, scale_up: bool) -> (u32, u32) {
    let (w, h) = size;
    if !scale_up && w.max(h) <= max_dim {
        return (w, h);
    }
    if h > w {
        let new_w = (max_dim as f64 * w as f64 / h as f64).round() as u32;
        (new_w, max_dim)
    } else {
        let new_h = (max_dim as f64 * h as f64 / w as f64).round() as u32;
        (max_dim, new_h)
    }
}

/// Generate the resolution schedule: `end`, then `end / 2^(k/2)` for
/// k = 1, 2, … (rounded) while the result stays at or above `start`;
/// deduplicated and sorted ascending.
pub fn gen_scales(start: u32, end: u32) -> Vec<u32> {
    let mut scales = Vec::new();
    let mut i = 0u32;
    loop {
        let scale = (end as f64 / 2f64.powf(i as f64 / 2.0)).round() as u32;
        if scale < start {
            break;
        }
        if !scales.contains(&scale) {
            scales.push(scale);
        }
        i += 1;
    }
    scales.sort_unstable();
    scales
}

/// Rescale `weights` so that the absolute values sum to 1. Negative weights
/// keep their sign (a negative style weight subtracts that style's
/// statistics from the blended target).
pub fn normalize_weights(weights: &[f32]) -> Vec<f32> {
    let sum: f32 = weights.iter().map(|w| w.abs()).sum();
    weights.iter().map(|w| w / sum).collect()
}
