//! Recognized-text overlay: raster rendering and shared layout.
//!
//! [`render`] styles every retained word once ([`style::layout`]) and
//! draws it onto a copy of the base bitmap. The returned
//! [`OverlaySpec`]s are the single source of truth for geometry and
//! colour, so the vector twin serialized from them matches the raster
//! word for word.

pub mod builtin;
pub mod raster;
pub mod style;
pub mod typeface;

use image::RgbImage;
use tracing::debug;

pub use style::{OverlaySpec, Palette};
pub use typeface::{BuiltinFace, FontCache, Typeface, TypefaceSource};

use crate::ocr::OcrWord;

/// Output of one overlay render.
#[derive(Debug, Clone)]
pub struct OverlayRender {
    /// The base bitmap with every word drawn on it.
    pub raster: RgbImage,
    /// Per-word styling, in input order, for the vector twin.
    pub specs: Vec<OverlaySpec>,
}

/// Draw `words` over a copy of `base`.
///
/// Words whose boxes are degenerate or lie entirely outside `base` are
/// skipped. Font handles are cached per pixel size for this call only.
#[must_use = "returns the rendered overlay"]
pub fn render(
    base: &RgbImage,
    words: &[OcrWord],
    typeface: &Typeface,
    min_font_size: u32,
) -> OverlayRender {
    let specs = style::layout(base, words, min_font_size);
    let mut raster = base.clone();
    let mut cache = FontCache::new(typeface);

    for spec in &specs {
        #[allow(clippy::cast_precision_loss)]
        let (left, top) = (spec.left as f32, spec.top as f32);
        match cache.text_path(&spec.text, spec.font_size, left, top) {
            Some(path) => raster::draw_word(&mut raster, &path, spec),
            None => debug!(text = %spec.text, "word has no drawable glyphs"),
        }
    }
    debug!(
        words = specs.len(),
        sizes = cache.loaded_sizes(),
        face = typeface.kind(),
        "overlay rendered"
    );

    OverlayRender { raster, specs }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn word(text: &str, left: i32, top: i32, height: i32) -> OcrWord {
        OcrWord {
            left,
            top,
            width: 40,
            height,
            confidence: 95.0,
            text: text.to_string(),
        }
    }

    #[test]
    fn render_keeps_dimensions_and_marks_pixels() {
        let base = RgbImage::from_pixel(120, 60, Rgb([255, 255, 255]));
        let out = render(&base, &[word("HI", 10, 10, 20)], &Typeface::Builtin, 10);
        assert_eq!(out.raster.dimensions(), (120, 60));
        assert_eq!(out.specs.len(), 1);
        assert!(out.raster.pixels().any(|p| p.0 == [10, 10, 10]));
        // Base is untouched.
        assert!(base.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn skipped_words_do_not_draw() {
        let base = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let out = render(&base, &[word("X", 500, 500, 20)], &Typeface::Builtin, 10);
        assert!(out.specs.is_empty());
        assert_eq!(out.raster, base);
    }

    #[test]
    fn render_is_deterministic() {
        let base = RgbImage::from_fn(80, 40, |x, _| Rgb([(x * 3) as u8, 90, 200]));
        let words = [word("AB", 2, 2, 14), word("cd", 40, 20, 12)];
        let a = render(&base, &words, &Typeface::Builtin, 10);
        let b = render(&base, &words, &Typeface::Builtin, 10);
        assert_eq!(a.raster, b.raster);
        assert_eq!(a.specs, b.specs);
    }
}
