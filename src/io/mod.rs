//! I/O operations for loading and saving data.
//!
//! This module handles all file format work:
//! - Image decode to [0,1] RGB tensors and encode back to 8/16-bit
//! - Safetensors weight files (pretrained feature-extractor parameters)

pub mod weights;

use std::path::Path;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::core::Tensor;
use crate::error::Result;

// Re-export public types and functions
pub use weights::{WeightStore, WeightsError};

/// 16-bit RGB image buffer, for high-bit-depth output.
pub type Rgb16Image = ImageBuffer<Rgb<u16>, Vec<u16>>;

/// Decode an image file into a 3×H×W tensor with values in [0, 1].
pub fn load_image(path: &Path) -> Result<Tensor> {
    let img = image::open(path)?.to_rgb8();
    Ok(rgb8_to_tensor(&img))
}

pub fn rgb8_to_tensor(img: &RgbImage) -> Tensor {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut t = Tensor::zeros(3, h, w);
    for (x, y, px) in img.enumerate_pixels() {
        for c in 0..3 {
            t.set(c, y as usize, x as usize, px.0[c] as f32 / 255.0);
        }
    }
    t
}

/// Quantize a [0,1] tensor to 8 bits per channel.
pub fn tensor_to_rgb8(t: &Tensor) -> RgbImage {
    assert_eq!(t.channels(), 3);
    let (w, h) = (t.width() as u32, t.height() as u32);
    let mut img = RgbImage::new(w, h);
    for y in 0..t.height() {
        for x in 0..t.width() {
            let px = [
                quantize(t.at(0, y, x), 255.0) as u8,
                quantize(t.at(1, y, x), 255.0) as u8,
                quantize(t.at(2, y, x), 255.0) as u8,
            ];
            img.put_pixel(x as u32, y as u32, Rgb(px));
        }
    }
    img
}

/// Quantize a [0,1] tensor to 16 bits per channel.
pub fn tensor_to_rgb16(t: &Tensor) -> Rgb16Image {
    assert_eq!(t.channels(), 3);
    let (w, h) = (t.width() as u32, t.height() as u32);
    let mut img = Rgb16Image::new(w, h);
    for y in 0..t.height() {
        for x in 0..t.width() {
            let px = [
                quantize(t.at(0, y, x), 65535.0) as u16,
                quantize(t.at(1, y, x), 65535.0) as u16,
                quantize(t.at(2, y, x), 65535.0) as u16,
            ];
            img.put_pixel(x as u32, y as u32, Rgb(px));
        }
    }
    img
}

#[inline]
fn quantize(v: f32, max: f32) -> u32 {
    (v * max).round().clamp(0.0, max) as u32
}

/// Save a [0,1] tensor as an 8-bit image; format follows the extension.
pub fn save_image(t: &Tensor, path: &Path) -> Result<()> {
    tensor_to_rgb8(t).save(path)?;
    Ok(())
}
