//! Per-word colour and size decisions.
//!
//! Colour choice is a binary threshold on the mean luma under the word's
//! box: darker than [`LUMINANCE_THRESHOLD`] gets light text with a dark
//! outline, anything else gets dark text with a light outline. This is a
//! deliberate simplification, not perceptual colour science. The
//! threshold and the size ratios are fixed so output stays comparable
//! with earlier runs.

use image::{Rgb, RgbImage};
use tracing::debug;

use crate::enhance::luma;
use crate::ocr::OcrWord;

/// Mean luma (0-255) below which a box counts as dark.
pub const LUMINANCE_THRESHOLD: f64 = 110.0;

/// Font size as a fraction of box height; also the baseline offset.
pub const FONT_HEIGHT_RATIO: f64 = 0.92;

/// Raster outline thickness as a fraction of font size.
pub const RASTER_STROKE_RATIO: f64 = 0.08;

/// Vector outline thickness as a fraction of font size.
pub const VECTOR_STROKE_RATIO: f64 = 0.06;

/// Near-white.
pub const LIGHT: Rgb<u8> = Rgb([250, 250, 250]);

/// Near-black.
pub const DARK: Rgb<u8> = Rgb([10, 10, 10]);

/// Text fill and outline colours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    /// Glyph fill.
    pub fill: Rgb<u8>,
    /// Glyph outline.
    pub stroke: Rgb<u8>,
}

impl Palette {
    /// Light text on a dark outline.
    pub const LIGHT_ON_DARK: Self = Self {
        fill: LIGHT,
        stroke: DARK,
    };

    /// Dark text on a light outline.
    pub const DARK_ON_LIGHT: Self = Self {
        fill: DARK,
        stroke: LIGHT,
    };

    /// Pick the palette for a box of the given mean luma.
    #[must_use]
    pub fn for_luminance(mean: f64) -> Self {
        if mean < LUMINANCE_THRESHOLD {
            Self::LIGHT_ON_DARK
        } else {
            Self::DARK_ON_LIGHT
        }
    }
}

/// Everything needed to draw one word on either target.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySpec {
    /// Text to draw.
    pub text: String,
    /// Box left edge (raster anchor x, vector x).
    pub left: i32,
    /// Box top edge (raster anchor y).
    pub top: i32,
    /// Vector baseline: `top + round(height * 0.92)`.
    pub baseline: i32,
    /// Font size in pixels.
    pub font_size: u32,
    /// Fill and outline colours.
    pub palette: Palette,
    /// Raster outline thickness in pixels.
    pub raster_stroke: u32,
    /// Vector outline thickness in pixels.
    pub vector_stroke: u32,
    /// Mean luma that decided the palette.
    pub luminance: f64,
}

/// `max(minimum, round(box_height * 0.92))`.
#[must_use]
pub fn font_size(box_height: i32, minimum: u32) -> u32 {
    round_px(f64::from(box_height) * FONT_HEIGHT_RATIO).max(minimum)
}

/// `max(1, round(font_size * 0.08))`.
#[must_use]
pub fn raster_stroke(font_size: u32) -> u32 {
    round_px(f64::from(font_size) * RASTER_STROKE_RATIO).max(1)
}

/// `max(1, round(font_size * 0.06))`.
#[must_use]
pub fn vector_stroke(font_size: u32) -> u32 {
    round_px(f64::from(font_size) * VECTOR_STROKE_RATIO).max(1)
}

/// Mean luma of `base` inside the word's box, clipped to the image.
/// `None` when nothing of the box lies inside the image.
#[must_use]
pub fn mean_luminance(base: &RgbImage, word: &OcrWord) -> Option<f64> {
    let (x0, x1) = clip_span(word.left, word.width, base.width())?;
    let (y0, y1) = clip_span(word.top, word.height, base.height())?;

    let mut sum = 0_u64;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += u64::from(luma(base.get_pixel(x, y).0));
        }
    }
    let count = u64::from(x1 - x0) * u64::from(y1 - y0);
    #[allow(clippy::cast_precision_loss)]
    let mean = sum as f64 / count as f64;
    Some(mean)
}

/// Style every word in order, skipping boxes that are degenerate once
/// clipped to the base image.
#[must_use]
pub fn layout(base: &RgbImage, words: &[OcrWord], min_font_size: u32) -> Vec<OverlaySpec> {
    let mut specs = Vec::with_capacity(words.len());
    for word in words {
        if word.width <= 0 || word.height <= 0 {
            debug!(text = %word.text, "skipping degenerate OCR box");
            continue;
        }
        let Some(luminance) = mean_luminance(base, word) else {
            debug!(text = %word.text, left = word.left, top = word.top, "OCR box outside image");
            continue;
        };
        let size = font_size(word.height, min_font_size);
        let offset = i32::try_from(round_px(f64::from(word.height) * FONT_HEIGHT_RATIO))
            .unwrap_or(i32::MAX);
        specs.push(OverlaySpec {
            text: word.text.clone(),
            left: word.left,
            top: word.top,
            baseline: word.top.saturating_add(offset),
            font_size: size,
            palette: Palette::for_luminance(luminance),
            raster_stroke: raster_stroke(size),
            vector_stroke: vector_stroke(size),
            luminance,
        });
    }
    specs
}

/// `[start, start + len)` intersected with `[0, limit)`.
fn clip_span(start: i32, len: i32, limit: u32) -> Option<(u32, u32)> {
    let lo = i64::from(start).max(0);
    let hi = (i64::from(start) + i64::from(len)).min(i64::from(limit));
    if hi <= lo {
        return None;
    }
    Some((u32::try_from(lo).ok()?, u32::try_from(hi).ok()?))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_px(v: f64) -> u32 {
    v.round().clamp(0.0, f64::from(u32::MAX)) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn word(left: i32, top: i32, width: i32, height: i32) -> OcrWord {
        OcrWord {
            left,
            top,
            width,
            height,
            confidence: 90.0,
            text: "w".to_string(),
        }
    }

    fn grey(v: u8) -> RgbImage {
        RgbImage::from_pixel(40, 40, Rgb([v, v, v]))
    }

    #[test]
    fn threshold_boundary() {
        let below = layout(&grey(109), &[word(0, 0, 10, 10)], 10);
        let at = layout(&grey(110), &[word(0, 0, 10, 10)], 10);
        assert_eq!(below[0].palette, Palette::LIGHT_ON_DARK);
        assert_eq!(at[0].palette, Palette::DARK_ON_LIGHT);
        assert!((below[0].luminance - 109.0).abs() < f64::EPSILON);
    }

    #[test]
    fn luminance_only_samples_the_box() {
        let mut img = grey(255);
        for y in 10..20 {
            for x in 10..20 {
                img.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        let mean = mean_luminance(&img, &word(10, 10, 10, 10)).unwrap();
        assert!(mean.abs() < f64::EPSILON);
        let mean = mean_luminance(&img, &word(10, 10, 20, 10)).unwrap();
        assert!((mean - 127.5).abs() < f64::EPSILON);
    }

    #[test]
    fn font_size_formula() {
        assert_eq!(font_size(100, 10), 92);
        assert_eq!(font_size(5, 10), 10);
        // 0.92 * 13 = 11.96
        assert_eq!(font_size(13, 10), 12);
    }

    #[test]
    fn stroke_widths_differ_between_targets() {
        assert_eq!(raster_stroke(92), 7);
        assert_eq!(vector_stroke(92), 6);
        assert_eq!(raster_stroke(10), 1);
        assert_eq!(vector_stroke(10), 1);
        assert_eq!(raster_stroke(50), 4);
        assert_eq!(vector_stroke(50), 3);
    }

    #[test]
    fn baseline_sits_at_ratio_of_box_height() {
        let specs = layout(&grey(200), &[word(3, 7, 20, 25)], 10);
        // round(25 * 0.92) = round(23.0) = 23
        assert_eq!(specs[0].baseline, 30);
        assert_eq!((specs[0].left, specs[0].top), (3, 7));
    }

    #[test]
    fn degenerate_and_offscreen_boxes_are_skipped() {
        let words = [
            word(0, 0, 0, 10),
            word(0, 0, 10, -1),
            word(100, 100, 10, 10),
            word(-20, -20, 10, 10),
            word(35, 35, 10, 10),
        ];
        let specs = layout(&grey(50), &words, 10);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].left, 35);
    }

    #[test]
    fn layout_preserves_input_order() {
        let mut a = word(0, 0, 5, 5);
        a.text = "first".to_string();
        let mut b = word(20, 20, 5, 5);
        b.text = "second".to_string();
        let specs = layout(&grey(10), &[a, b], 10);
        let texts: Vec<&str> = specs.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }
}
