//! Image decoding and canonicalization ahead of feature extraction.

use std::path::Path;

use image::imageops::FilterType;
use image::ImageReader;
use ndarray::Array3;

use crate::types::{FloraError, FloraResult};

/// Canonical edge length for descriptor computation.
pub const IMAGE_SIZE: u32 = 224;

/// A decoded image resized to a fixed resolution with channel values
/// scaled into [0, 1]. Shape is (height, width, 3), RGB order.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub pixels: Array3<f32>,
}

impl PreprocessedImage {
    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }
}

/// Decode, resize, and normalize an image file.
///
/// Triangle (bilinear) interpolation is used unconditionally so that
/// identical input bytes always produce an identical pixel grid —
/// cached descriptors depend on this.
pub fn preprocess(path: &Path, size: u32) -> FloraResult<PreprocessedImage> {
    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(|e| FloraError::InvalidImage(e.to_string()))?;

    if reader.format().is_none() {
        return Err(FloraError::InvalidImage(format!(
            "unrecognized image format: {}",
            path.display()
        )));
    }

    let img = reader
        .decode()
        .map_err(|e| FloraError::InvalidImage(e.to_string()))?;

    let rgb = img
        .resize_exact(size, size, FilterType::Triangle)
        .to_rgb8();

    let (w, h) = rgb.dimensions();
    let mut pixels = Array3::<f32>::zeros((h as usize, w as usize, 3));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            pixels[[y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }

    Ok(PreprocessedImage { pixels })
}
