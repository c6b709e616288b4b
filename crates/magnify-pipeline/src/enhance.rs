//! Point and neighbourhood enhancement operators.
//!
//! These are the building blocks of both traditional backends:
//! [`unsharp_blend`] for the equalized path, and the unsharp mask /
//! autocontrast / contrast / sharpness sequence for the basic path.
//! All operators return a fresh bitmap.

use image::{Rgb, RgbImage};

use crate::blur::gaussian_blur_rgb;
use crate::clahe::to_u8;

/// Luma of an RGB pixel with 16-bit fixed-point BT.601 weights.
///
/// The weights sum to 65536, so a neutral grey maps to itself exactly.
#[must_use]
pub const fn luma([r, g, b]: [u8; 3]) -> u8 {
    let y = (r as u32 * 19_595 + g as u32 * 38_470 + b as u32 * 7_471 + 0x8000) >> 16;
    #[allow(clippy::cast_possible_truncation)]
    let y = y as u8;
    y
}

/// Sharpen by weighted subtraction of a Gaussian-blurred copy:
/// `out = base*k - blurred*(k-1)`, rounded and clamped.
#[must_use = "returns the sharpened image"]
pub fn unsharp_blend(image: &RgbImage, sigma: f32, amount: f32) -> RgbImage {
    let blurred = gaussian_blur_rgb(image, sigma);
    let k = f64::from(amount);
    map_pairs(image, &blurred, |base, soft| {
        to_u8(f64::from(base).mul_add(k, -f64::from(soft) * (k - 1.0)))
    })
}

/// Classic unsharp mask: channels differing from the blurred copy by
/// more than `threshold` are pushed away from it by `percent`/100 of
/// the difference.
#[must_use = "returns the sharpened image"]
pub fn unsharp_mask(image: &RgbImage, radius: f32, percent: u32, threshold: u8) -> RgbImage {
    let blurred = gaussian_blur_rgb(image, radius);
    let gain = f64::from(percent) / 100.0;
    map_pairs(image, &blurred, |src, soft| {
        let diff = i16::from(src) - i16::from(soft);
        if diff.unsigned_abs() > u16::from(threshold) {
            to_u8(f64::from(diff).mul_add(gain, f64::from(src)))
        } else {
            src
        }
    })
}

/// Stretch each channel so that, after discarding `cutoff` percent of
/// the pixels from each end of its histogram, the remaining range
/// covers 0-255. Flat channels are left untouched.
#[must_use = "returns the stretched image"]
pub fn autocontrast(image: &RgbImage, cutoff: f64) -> RgbImage {
    let mut luts = [[0_u8; 256]; 3];
    for (c, lut) in luts.iter_mut().enumerate() {
        let mut hist = [0_u64; 256];
        for p in image.pixels() {
            hist[usize::from(p.0[c])] += 1;
        }
        *lut = stretch_lut(&hist, cutoff);
    }
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let p = image.get_pixel(x, y).0;
        Rgb([
            luts[0][usize::from(p[0])],
            luts[1][usize::from(p[1])],
            luts[2][usize::from(p[2])],
        ])
    })
}

/// Blend away from a flat grey image at the mean luma.
#[must_use = "returns the adjusted image"]
pub fn adjust_contrast(image: &RgbImage, factor: f64) -> RgbImage {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return image.clone();
    }
    let total: u64 = image.pixels().map(|p| u64::from(luma(p.0))).sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = to_u8(total as f64 / count as f64);
    let flat = RgbImage::from_pixel(image.width(), image.height(), Rgb([mean; 3]));
    blend(&flat, image, factor)
}

/// Blend away from a smoothed copy (3×3 kernel, centre weight 5).
#[must_use = "returns the adjusted image"]
pub fn adjust_sharpness(image: &RgbImage, factor: f64) -> RgbImage {
    blend(&smooth(image), image, factor)
}

/// `degenerate + factor * (image - degenerate)`, rounded and clamped.
fn blend(degenerate: &RgbImage, image: &RgbImage, factor: f64) -> RgbImage {
    map_pairs(image, degenerate, |src, base| {
        to_u8((f64::from(src) - f64::from(base)).mul_add(factor, f64::from(base)))
    })
}

/// 3×3 smoothing with weights `[1 1 1; 1 5 1; 1 1 1] / 13`. Border
/// pixels are copied unchanged.
fn smooth(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x + 1 >= w || y + 1 >= h {
            return *image.get_pixel(x, y);
        }
        let mut acc = [0_u32; 3];
        for dy in 0..3 {
            for dx in 0..3 {
                let weight = if dx == 1 && dy == 1 { 5 } else { 1 };
                let p = image.get_pixel(x + dx - 1, y + dy - 1).0;
                for c in 0..3 {
                    acc[c] += u32::from(p[c]) * weight;
                }
            }
        }
        Rgb(acc.map(|v| to_u8(f64::from(v) / 13.0)))
    })
}

fn stretch_lut(hist: &[u64; 256], cutoff: f64) -> [u8; 256] {
    let total: u64 = hist.iter().sum();
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let cut = (total as f64 * cutoff / 100.0) as u64;

    let lo = trimmed_edge(hist.iter().enumerate(), cut);
    let hi = trimmed_edge(hist.iter().enumerate().rev(), cut);

    let mut lut = [0_u8; 256];
    match (lo, hi) {
        (Some(lo), Some(hi)) if hi > lo => {
            let scale = 255.0 / (hi - lo) as f64;
            for (i, slot) in lut.iter_mut().enumerate() {
                *slot = to_u8((i as f64 - lo as f64) * scale);
            }
        }
        _ => {
            for (i, slot) in lut.iter_mut().enumerate() {
                #[allow(clippy::cast_possible_truncation)]
                let identity = i as u8;
                *slot = identity;
            }
        }
    }
    lut
}

/// First bin index (in iteration order) still populated once `cut`
/// pixels have been removed from that end.
fn trimmed_edge<'a>(bins: impl Iterator<Item = (usize, &'a u64)>, cut: u64) -> Option<usize> {
    let mut remaining = cut;
    for (i, &count) in bins {
        if count > remaining {
            return Some(i);
        }
        remaining -= count;
    }
    None
}

fn map_pairs(a: &RgbImage, b: &RgbImage, f: impl Fn(u8, u8) -> u8) -> RgbImage {
    RgbImage::from_fn(a.width(), a.height(), |x, y| {
        let pa = a.get_pixel(x, y).0;
        let pb = b.get_pixel(x, y).0;
        Rgb([f(pa[0], pb[0]), f(pa[1], pb[1]), f(pa[2], pb[2])])
    })
}
