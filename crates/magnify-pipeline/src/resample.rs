//! Integer-factor enlargement with a Lanczos filter.
//!
//! Used as the first step of both traditional backends and as the
//! deterministic fallback when a small-scale learned model is missing
//! from the chained stage.

use image::RgbImage;
use image::imageops::FilterType;

/// Enlarge `image` by `factor` on both axes using Lanczos3.
///
/// A factor of 1 returns a copy. Dimensions saturate rather than
/// overflow.
#[must_use = "returns the enlarged image"]
pub fn lanczos_upscale(image: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return image.clone();
    }
    let width = image.width().saturating_mul(factor);
    let height = image.height().saturating_mul(factor);
    image::imageops::resize(image, width, height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_exact_multiple() {
        let img = RgbImage::new(13, 7);
        let out = lanczos_upscale(&img, 8);
        assert_eq!((out.width(), out.height()), (104, 56));
    }

    #[test]
    fn factor_one_is_identity() {
        let img = RgbImage::from_fn(5, 5, |x, y| image::Rgb([x as u8, y as u8, 0]));
        assert_eq!(lanczos_upscale(&img, 1), img);
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let img = RgbImage::from_pixel(4, 3, image::Rgb([90, 140, 200]));
        let out = lanczos_upscale(&img, 2);
        let expected = [90_i16, 140, 200];
        for p in out.pixels() {
            for c in 0..3 {
                assert!((i16::from(p.0[c]) - expected[c]).abs() <= 1);
            }
        }
    }

    #[test]
    fn repeated_calls_are_identical() {
        let img = RgbImage::from_fn(9, 9, |x, y| image::Rgb([(x * 29) as u8, (y * 23) as u8, 7]));
        assert_eq!(lanczos_upscale(&img, 4), lanczos_upscale(&img, 4));
    }
}
