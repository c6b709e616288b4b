//! Channel-wise Gaussian blur, the low-pass half of every unsharp blend.
//!
//! `imageproc` blurs single-channel images only, so the RGB bitmap is
//! split into planes, each plane is blurred on its own and the planes are
//! zipped back together.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Blur each channel of an RGB bitmap independently.
///
/// A `sigma` of zero or less leaves the bitmap unchanged.
#[must_use = "returns the blurred RGB image"]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    let (w, h) = image.dimensions();
    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| Luma([image.get_pixel(x, y).0[c]]))
    });
    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}
