//! Resampling of image-shaped (3-channel) tensors.
//!
//! Everything that gets resampled in this system is image-shaped: the
//! working image between scales, content/style inputs, and the per-pixel
//! Adam moment state. Feature maps are never resampled. Resampling goes
//! through `image::imageops`: CatmullRom for bicubic, Triangle for
//! bilinear.

use image::imageops::{self, FilterType};
use image::Rgb32FImage;

use crate::core::Tensor;

fn to_interleaved(t: &Tensor) -> Rgb32FImage {
    assert_eq!(t.channels(), 3);
    let (w, h) = (t.width() as u32, t.height() as u32);
    let mut img = Rgb32FImage::new(w, h);
    for y in 0..t.height() {
        for x in 0..t.width() {
            img.put_pixel(
                x as u32,
                y as u32,
                image::Rgb([t.at(0, y, x), t.at(1, y, x), t.at(2, y, x)]),
            );
        }
    }
    img
}

fn from_interleaved(img: &Rgb32FImage) -> Tensor {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut t = Tensor::zeros(3, h, w);
    for (x, y, px) in img.enumerate_pixels() {
        t.set(0, y as usize, x as usize, px.0[0]);
        t.set(1, y as usize, x as usize, px.0[1]);
        t.set(2, y as usize, x as usize, px.0[2]);
    }
    t
}

fn resize(t: &Tensor, width: usize, height: usize, filter: FilterType) -> Tensor {
    if (t.width(), t.height()) == (width, height) {
        return t.clone();
    }
    let img = to_interleaved(t);
    let resized = imageops::resize(&img, width as u32, height as u32, filter);
    from_interleaved(&resized)
}

/// Bicubic resampling. Used for the image itself and for signed
/// (direction-like) optimizer state, which must follow the image.
pub fn resize_bicubic(t: &Tensor, width: usize, height: usize) -> Tensor {
    resize(t, width, height, FilterType::CatmullRom)
}

/// Bilinear resampling. Used for magnitude-like optimizer state; the
/// caller clamps the result non-negative since cubic/linear overshoot
/// must not produce negative second moments.
pub fn resize_bilinear(t: &Tensor, width: usize, height: usize) -> Tensor {
    resize(t, width, height, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_resize_identity_when_same_size() {
        let t = Tensor::from_data(3, 1, 2, vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
        let r = resize_bicubic(&t, 2, 1);
        assert_eq!(r, t);
    }

    #[test]
    fn test_resize_constant_image_stays_constant() {
        let t = Tensor::full(3, 4, 4, 0.25);
        let up = resize_bicubic(&t, 8, 8);
        assert_eq!(up.shape(), (3, 8, 8));
        for &v in up.data() {
            assert_relative_eq!(v, 0.25, epsilon = 1e-5);
        }
        let down = resize_bilinear(&t, 2, 2);
        for &v in down.data() {
            assert_relative_eq!(v, 0.25, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_roundtrip_interleaved() {
        let t = Tensor::from_data(3, 2, 1, vec![0.0, 1.0, 0.25, 0.75, 0.5, 0.125]);
        let back = from_interleaved(&to_interleaved(&t));
        assert_eq!(back, t);
    }
}
