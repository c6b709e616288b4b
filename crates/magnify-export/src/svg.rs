//! Vector twin of the text overlay.
//!
//! Emits one `<text>` element per [`OverlaySpec`], in order, with the
//! same colours the raster used. Text is anchored at the box's left
//! edge and the computed baseline; the outline uses the vector stroke
//! width and `paint-order="stroke fill"` so it sits behind the glyph
//! fill like the raster outline does.
//!
//! The document is built by hand rather than through a DOM crate so the
//! attribute order, and therefore the output bytes, are stable.

use std::fmt::{self, Write};

use magnify_pipeline::{Dimensions, OverlaySpec, types::Rgb};

/// Font stack for the overlay text.
const TEXT_STYLE: &str = "text{font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',\
'PingFang SC','Hiragino Sans GB','Microsoft YaHei','Noto Sans CJK SC',sans-serif;\
font-weight:650;}";

/// Escape the five XML special characters for safe embedding in element
/// text content and attribute values.
///
/// Handles `&` (must be first), `<`, `>`, `"`, and `'`.
#[must_use]
pub fn xml_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// `#rrggbb` for a pixel colour.
#[must_use]
pub fn hex_colour(colour: Rgb<u8>) -> String {
    let [r, g, b] = colour.0;
    format!("#{r:02x}{g:02x}{b:02x}")
}

/// Serialize the overlay as a standalone SVG document sized to the
/// overlay's base image.
#[must_use]
pub fn overlay_svg(dimensions: Dimensions, specs: &[OverlaySpec]) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_document(&mut out, dimensions, specs);
    out
}

fn write_document(out: &mut String, dimensions: Dimensions, specs: &[OverlaySpec]) -> fmt::Result {
    write!(
        out,
        r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">
<style>
{TEXT_STYLE}
</style>
"#,
        w = dimensions.width,
        h = dimensions.height,
    )?;
    for spec in specs {
        writeln!(
            out,
            r#"<text x="{x}" y="{y}" font-size="{size}" fill="{fill}" stroke="{stroke}" stroke-width="{width}" paint-order="stroke fill">{text}</text>"#,
            x = spec.left,
            y = spec.baseline,
            size = spec.font_size,
            fill = hex_colour(spec.palette.fill),
            stroke = hex_colour(spec.palette.stroke),
            width = spec.vector_stroke,
            text = xml_escape(&spec.text),
        )?;
    }
    writeln!(out, "</svg>")
}

#[cfg(test)]
mod tests {
    use magnify_pipeline::Palette;

    use super::*;

    fn spec(text: &str, palette: Palette) -> OverlaySpec {
        OverlaySpec {
            text: text.to_string(),
            left: 12,
            top: 30,
            baseline: 53,
            font_size: 23,
            palette,
            raster_stroke: 2,
            vector_stroke: 1,
            luminance: 42.0,
        }
    }

    fn dims() -> Dimensions {
        Dimensions {
            width: 800,
            height: 400,
        }
    }

    #[test]
    fn empty_overlay_is_valid_document() {
        let svg = overlay_svg(dims(), &[]);
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"viewBox="0 0 800 400""#));
        assert!(svg.contains("font-weight:650;"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(!svg.contains("<text"));
    }

    #[test]
    fn text_element_carries_layout_and_colours() {
        let svg = overlay_svg(dims(), &[spec("Total", Palette::LIGHT_ON_DARK)]);
        assert!(svg.contains(
            r##"<text x="12" y="53" font-size="23" fill="#fafafa" stroke="#0a0a0a" stroke-width="1" paint-order="stroke fill">Total</text>"##
        ));
    }

    #[test]
    fn dark_palette_swaps_colours() {
        let svg = overlay_svg(dims(), &[spec("x", Palette::DARK_ON_LIGHT)]);
        assert!(svg.contains(r##"fill="#0a0a0a" stroke="#fafafa""##));
    }

    #[test]
    fn reserved_characters_are_escaped() {
        let svg = overlay_svg(dims(), &[spec(r#"<a & "b" 'c'>"#, Palette::DARK_ON_LIGHT)]);
        assert!(svg.contains(">&lt;a &amp; &quot;b&quot; &#x27;c&#x27;&gt;</text>"));
    }

    #[test]
    fn one_element_per_spec_in_order() {
        let specs = [
            spec("first", Palette::DARK_ON_LIGHT),
            spec("second", Palette::LIGHT_ON_DARK),
        ];
        let svg = overlay_svg(dims(), &specs);
        assert_eq!(svg.matches("<text ").count(), 2);
        let first = svg.find(">first<").unwrap_or(usize::MAX);
        let second = svg.find(">second<").unwrap_or(0);
        assert!(first < second);
    }

    #[test]
    fn hex_colour_is_lowercase_padded() {
        assert_eq!(hex_colour(Rgb([10, 250, 0])), "#0afa00");
    }
}
