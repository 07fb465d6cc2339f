//! Deterministic 177-dimensional image descriptors.
//!
//! Layout, in order: 32-bin histograms over red, green, blue, hue, and
//! saturation (160 values), one edge-density scalar, and a 16-bin local
//! binary pattern histogram (16 values). Bin counts, value ranges, and
//! concatenation order are a wire format: cached descriptors are only
//! comparable to freshly computed ones if all three stay fixed.

use crate::preprocess::PreprocessedImage;
use crate::types::{FloraError, FloraResult};

/// Total descriptor length.
pub const FEATURE_DIM: usize = COLOR_BINS * 5 + 1 + TEXTURE_BINS;

const COLOR_BINS: usize = 32;
const TEXTURE_BINS: usize = 16;

/// Sobel gradient-magnitude thresholds for the edge pass, on the
/// 0–255 intensity scale.
const EDGE_LOW: f32 = 50.0;
const EDGE_HIGH: f32 = 150.0;

/// LBP neighbor offsets in fixed clockwise order from top-left.
/// Neighbor k contributes 2^k when brighter than the center.
const LBP_NEIGHBORS: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
];

/// Compute the fixed-length descriptor for a preprocessed image.
pub fn extract(img: &PreprocessedImage) -> FloraResult<Vec<f32>> {
    let h = img.height();
    let w = img.width();
    if h == 0 || w == 0 {
        return Err(FloraError::FeatureExtraction(format!(
            "degenerate image: {w}x{h}"
        )));
    }

    let gray = grayscale(img);

    let mut features = Vec::with_capacity(FEATURE_DIM);
    features.extend(channel_histogram(img, 0, 0.0, 1.0));
    features.extend(channel_histogram(img, 1, 0.0, 1.0));
    features.extend(channel_histogram(img, 2, 0.0, 1.0));

    let (hues, sats) = hue_saturation(img);
    features.extend(histogram(&hues, COLOR_BINS, 0.0, 360.0));
    features.extend(histogram(&sats, COLOR_BINS, 0.0, 1.0));

    features.push(edge_density(&gray, w, h));
    features.extend(texture_histogram(&gray, w, h));

    debug_assert_eq!(features.len(), FEATURE_DIM);
    Ok(features)
}

/// ITU-R BT.601 luma, quantized to the 0–255 scale the edge and
/// texture passes operate on.
fn grayscale(img: &PreprocessedImage) -> Vec<u8> {
    let h = img.height();
    let w = img.width();
    let mut gray = Vec::with_capacity(h * w);
    for y in 0..h {
        for x in 0..w {
            let r = img.pixels[[y, x, 0]];
            let g = img.pixels[[y, x, 1]];
            let b = img.pixels[[y, x, 2]];
            let luma = (0.299 * r + 0.587 * g + 0.114 * b) * 255.0;
            gray.push(luma.round().clamp(0.0, 255.0) as u8);
        }
    }
    gray
}

/// Hue in degrees [0, 360) and saturation in [0, 1] per pixel.
fn hue_saturation(img: &PreprocessedImage) -> (Vec<f32>, Vec<f32>) {
    let h = img.height();
    let w = img.width();
    let mut hues = Vec::with_capacity(h * w);
    let mut sats = Vec::with_capacity(h * w);

    for y in 0..h {
        for x in 0..w {
            let r = img.pixels[[y, x, 0]];
            let g = img.pixels[[y, x, 1]];
            let b = img.pixels[[y, x, 2]];

            let max = r.max(g).max(b);
            let min = r.min(g).min(b);
            let delta = max - min;

            let hue = if delta == 0.0 {
                0.0
            } else if max == r {
                60.0 * (((g - b) / delta).rem_euclid(6.0))
            } else if max == g {
                60.0 * ((b - r) / delta + 2.0)
            } else {
                60.0 * ((r - g) / delta + 4.0)
            };

            let sat = if max == 0.0 { 0.0 } else { delta / max };

            hues.push(hue);
            sats.push(sat);
        }
    }

    (hues, sats)
}

fn channel_histogram(img: &PreprocessedImage, channel: usize, min: f32, max: f32) -> Vec<f32> {
    let values: Vec<f32> = img
        .pixels
        .index_axis(ndarray::Axis(2), channel)
        .iter()
        .copied()
        .collect();
    histogram(&values, COLOR_BINS, min, max)
}

/// Raw-count histogram over [min, max). Values at max land in the last
/// bin; values outside the range are clamped.
fn histogram(values: &[f32], bins: usize, min: f32, max: f32) -> Vec<f32> {
    let mut counts = vec![0.0f32; bins];
    let span = max - min;
    for &v in values {
        let idx = (((v - min) / span) * bins as f32) as isize;
        let idx = idx.clamp(0, bins as isize - 1) as usize;
        counts[idx] += 1.0;
    }
    counts
}

/// Fraction of pixels marked as edges by a Sobel pass with
/// two-threshold hysteresis: magnitude >= high is an edge; magnitude in
/// [low, high) is kept only when 8-adjacent to a strong edge.
fn edge_density(gray: &[u8], w: usize, h: usize) -> f32 {
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut magnitude = vec![0.0f32; w * h];
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dy: usize, dx: usize| gray[(y + dy - 1) * w + (x + dx - 1)] as f32;
            let gx = -p(0, 0) + p(0, 2) - 2.0 * p(1, 0) + 2.0 * p(1, 2) - p(2, 0) + p(2, 2);
            let gy = -p(0, 0) - 2.0 * p(0, 1) - p(0, 2) + p(2, 0) + 2.0 * p(2, 1) + p(2, 2);
            magnitude[y * w + x] = (gx * gx + gy * gy).sqrt();
        }
    }

    let mut strong = vec![false; w * h];
    for (i, &m) in magnitude.iter().enumerate() {
        strong[i] = m >= EDGE_HIGH;
    }

    let mut edges = 0u64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            if strong[i] {
                edges += 1;
                continue;
            }
            if magnitude[i] >= EDGE_LOW {
                let neighbor_strong = LBP_NEIGHBORS.iter().any(|&(dy, dx)| {
                    let ny = (y as isize + dy) as usize;
                    let nx = (x as isize + dx) as usize;
                    strong[ny * w + nx]
                });
                if neighbor_strong {
                    edges += 1;
                }
            }
        }
    }

    edges as f32 / (w * h) as f32
}

/// 16-bin histogram of 8-bit local binary patterns over interior
/// pixels. Direct flat-buffer indexing: this loop dominates descriptor
/// cost on large reference sets.
fn texture_histogram(gray: &[u8], w: usize, h: usize) -> Vec<f32> {
    let mut counts = vec![0.0f32; TEXTURE_BINS];
    if w < 3 || h < 3 {
        return counts;
    }

    for y in 1..h - 1 {
        let row = y * w;
        for x in 1..w - 1 {
            let center = gray[row + x];
            let mut pattern = 0u32;
            for (k, &(dy, dx)) in LBP_NEIGHBORS.iter().enumerate() {
                let ny = (y as isize + dy) as usize;
                let nx = (x as isize + dx) as usize;
                if gray[ny * w + nx] > center {
                    pattern |= 1 << k;
                }
            }
            // 256 pattern values folded into 16 bins of width 16.
            counts[(pattern / 16) as usize] += 1.0;
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn solid(r: f32, g: f32, b: f32, size: usize) -> PreprocessedImage {
        let mut pixels = Array3::<f32>::zeros((size, size, 3));
        for y in 0..size {
            for x in 0..size {
                pixels[[y, x, 0]] = r;
                pixels[[y, x, 1]] = g;
                pixels[[y, x, 2]] = b;
            }
        }
        PreprocessedImage { pixels }
    }

    #[test]
    fn descriptor_has_fixed_length() {
        let features = extract(&solid(0.5, 0.2, 0.8, 16)).unwrap();
        assert_eq!(features.len(), FEATURE_DIM);
        assert_eq!(FEATURE_DIM, 177);
    }

    #[test]
    fn extraction_is_deterministic() {
        let img = solid(0.3, 0.6, 0.1, 32);
        let a = extract(&img).unwrap();
        let b = extract(&img).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn solid_red_fills_expected_bins() {
        let features = extract(&solid(1.0, 0.0, 0.0, 16)).unwrap();
        let total = 256.0;
        // Red channel: every pixel in the last bin.
        assert_eq!(features[COLOR_BINS - 1], total);
        // Green and blue: every pixel in the first bin.
        assert_eq!(features[COLOR_BINS], total);
        assert_eq!(features[COLOR_BINS * 2], total);
        // Hue 0 degrees, saturation 1.0.
        assert_eq!(features[COLOR_BINS * 3], total);
        assert_eq!(features[COLOR_BINS * 5 - 1], total);
    }

    #[test]
    fn flat_image_has_no_edges_and_flat_texture() {
        let features = extract(&solid(0.5, 0.5, 0.5, 32)).unwrap();
        let edge_density = features[COLOR_BINS * 5];
        assert_eq!(edge_density, 0.0);

        // All LBP patterns are 0 on a flat image: one interior pixel
        // count in the first texture bin, zero elsewhere.
        let texture = &features[COLOR_BINS * 5 + 1..];
        assert_eq!(texture[0], 30.0 * 30.0);
        assert!(texture[1..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn hard_vertical_boundary_produces_edges() {
        let size = 32;
        let mut pixels = Array3::<f32>::zeros((size, size, 3));
        for y in 0..size {
            for x in size / 2..size {
                for c in 0..3 {
                    pixels[[y, x, c]] = 1.0;
                }
            }
        }
        let features = extract(&PreprocessedImage { pixels }).unwrap();
        let edge_density = features[COLOR_BINS * 5];
        assert!(edge_density > 0.0);
        assert!(edge_density < 0.5);
    }

    #[test]
    fn degenerate_image_is_rejected() {
        let img = PreprocessedImage {
            pixels: Array3::<f32>::zeros((0, 0, 3)),
        };
        let err = extract(&img).unwrap_err();
        assert!(matches!(err, FloraError::FeatureExtraction(_)));
    }

    #[test]
    fn histogram_clamps_out_of_range_values() {
        let counts = histogram(&[-1.0, 0.0, 0.5, 1.0, 2.0], 4, 0.0, 1.0);
        assert_eq!(counts, vec![2.0, 0.0, 1.0, 2.0]);
    }
}
