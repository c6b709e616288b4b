//! Decode arbitrary input images into a canonical opaque RGB bitmap.
//!
//! Anything the `image` decoders accept is supported. Sources that carry
//! an alpha channel (including palette or grey images with a declared
//! transparent colour, which the PNG decoder expands to alpha) are
//! composited over a solid background; everything else is converted by
//! plain channel reduction or expansion.

use image::{DynamicImage, Rgb, RgbImage};

use crate::types::PipelineError;

/// Decode raw image bytes.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Flatten a decoded image onto `background`, producing opaque RGB.
///
/// Uses alpha-over compositing with integer rounding:
/// `out = (src*a + bg*(255-a) + 127) / 255`. At `a = 255` the result is
/// exactly the straight RGB conversion; at `a = 0` it is exactly the
/// background.
#[must_use = "returns the flattened RGB bitmap"]
pub fn flatten_to_rgb(image: &DynamicImage, background: Rgb<u8>) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }

    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Rgb([
            over(r, background.0[0], a),
            over(g, background.0[1], a),
            over(b, background.0[2], a),
        ])
    })
}

/// Decode and flatten in one step.
///
/// # Errors
///
/// See [`decode`].
pub fn normalize(bytes: &[u8], background: Rgb<u8>) -> Result<RgbImage, PipelineError> {
    let decoded = decode(bytes)?;
    Ok(flatten_to_rgb(&decoded, background))
}

#[allow(clippy::cast_possible_truncation)]
const fn over(src: u8, bg: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    let mixed = (src as u32 * a + bg as u32 * (255 - a) + 127) / 255;
    // Bounded by 255 since both weights sum to 255.
    mixed as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_png(image: &DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = normalize(&[0xFF, 0xFE, 0x00, 0x01], WHITE);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn opaque_alpha_matches_straight_conversion() {
        let rgba = image::RgbaImage::from_fn(16, 16, |x, y| {
            image::Rgba([(x * 13) as u8, (y * 7) as u8, ((x + y) * 5) as u8, 255])
        });
        let image = DynamicImage::ImageRgba8(rgba);
        let flattened = flatten_to_rgb(&image, Rgb([1, 2, 3]));
        assert_eq!(flattened, image.to_rgb8());
    }

    #[test]
    fn transparent_alpha_yields_background() {
        let rgba = image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 10, 90, 0]));
        let flattened = flatten_to_rgb(&DynamicImage::ImageRgba8(rgba), Rgb([12, 34, 56]));
        assert!(flattened.pixels().all(|p| *p == Rgb([12, 34, 56])));
    }

    #[test]
    fn half_alpha_blends_toward_background() {
        let rgba = image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 128]));
        let flattened = flatten_to_rgb(&DynamicImage::ImageRgba8(rgba), WHITE);
        // 255 * 127 / 255 = 127
        assert_eq!(flattened.get_pixel(0, 0).0, [127, 127, 127]);
    }

    #[test]
    fn grey_alpha_source_is_flattened() {
        let la = image::GrayAlphaImage::from_pixel(3, 2, image::LumaA([40, 0]));
        let bytes = encode_png(&DynamicImage::ImageLumaA8(la));
        let flattened = normalize(&bytes, WHITE).unwrap();
        assert_eq!((flattened.width(), flattened.height()), (3, 2));
        assert!(flattened.pixels().all(|p| *p == WHITE));
    }

    #[test]
    fn grey_source_expands_to_rgb() {
        let gray = image::GrayImage::from_pixel(2, 2, image::Luma([77]));
        let bytes = encode_png(&DynamicImage::ImageLuma8(gray));
        let flattened = normalize(&bytes, WHITE).unwrap();
        assert!(flattened.pixels().all(|p| p.0 == [77, 77, 77]));
    }
}
