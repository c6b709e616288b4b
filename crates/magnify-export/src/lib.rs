//! magnify-export: Pure serializers (sans-IO)
//!
//! Turns pipeline output into documents: the SVG twin of the text
//! overlay, the JSON manifest, and the static HTML comparison page.
//! Nothing here touches the filesystem; every function returns a
//! `String`.

pub mod html;
pub mod svg;

pub use html::{LinkTarget, compare_html, link_for};
pub use svg::{overlay_svg, xml_escape};

use magnify_pipeline::ocr::OcrWord;
use magnify_pipeline::{Dimensions, Manifest, RgbImage, Typeface};

/// Errors raised by the serializers.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// JSON serialization failed.
    #[error("failed to serialize manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pretty-printed JSON for `manifest`, with a trailing newline.
///
/// # Errors
///
/// Returns [`ExportError::Json`] if serialization fails.
pub fn manifest_json(manifest: &Manifest) -> Result<String, ExportError> {
    let mut json = serde_json::to_string_pretty(manifest)?;
    json.push('\n');
    Ok(json)
}

/// Render the overlay raster and serialize its vector twin from the
/// same per-word layout.
#[must_use = "returns the raster and SVG overlay"]
pub fn render_overlay(
    base: &RgbImage,
    words: &[OcrWord],
    typeface: &Typeface,
    min_font_size: u32,
) -> (RgbImage, String) {
    let render = magnify_pipeline::overlay::render(base, words, typeface, min_font_size);
    let svg = overlay_svg(Dimensions::of(base), &render.specs);
    (render.raster, svg)
}
