//! Font faces and per-size glyph outline caching.
//!
//! A [`Typeface`] is either an outline font parsed by `ab_glyph` or the
//! built-in bitmap face. [`FontCache`] hands out scaled handles keyed by
//! integer pixel size for the duration of one render call and turns a
//! run of text into a single `tiny-skia` path anchored at a box's
//! top-left corner.

use std::collections::HashMap;

use ab_glyph::{Font, FontVec, GlyphId, OutlineCurve, PxScaleFont, ScaleFont};
use tiny_skia::{Path, PathBuilder, Rect};

use super::builtin;

/// A face the overlay can draw with.
pub enum Typeface {
    /// A parsed TrueType/OpenType font.
    Outline(FontVec),
    /// The compact bitmap fallback.
    Builtin,
}

impl Typeface {
    /// Short description for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Outline(_) => "outline",
            Self::Builtin => "builtin",
        }
    }
}

impl std::fmt::Debug for Typeface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Supplies the face an overlay is drawn with.
///
/// Implementations resolve fonts however they like but must always
/// return something; [`Typeface::Builtin`] is the floor.
pub trait TypefaceSource {
    /// Resolve the face.
    fn typeface(&self) -> Typeface;
}

/// A source that always yields the built-in face.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFace;

impl TypefaceSource for BuiltinFace {
    fn typeface(&self) -> Typeface {
        Typeface::Builtin
    }
}

enum SizedFace<'a> {
    Outline(PxScaleFont<&'a FontVec>),
    Builtin { unit: f32 },
}

/// Scaled font handles keyed by pixel size.
pub struct FontCache<'a> {
    typeface: &'a Typeface,
    sized: HashMap<u32, SizedFace<'a>>,
}

impl<'a> FontCache<'a> {
    /// An empty cache over `typeface`.
    #[must_use]
    pub fn new(typeface: &'a Typeface) -> Self {
        Self {
            typeface,
            sized: HashMap::new(),
        }
    }

    /// Number of distinct sizes loaded so far.
    #[must_use]
    pub fn loaded_sizes(&self) -> usize {
        self.sized.len()
    }

    /// Outline of `text` at `size` px with its em box's top-left corner
    /// at (`left`, `top`). `None` when nothing would be inked.
    pub fn text_path(&mut self, text: &str, size: u32, left: f32, top: f32) -> Option<Path> {
        let typeface = self.typeface;
        let face = self.sized.entry(size).or_insert_with(|| {
            #[allow(clippy::cast_precision_loss)]
            let px = size as f32;
            match typeface {
                Typeface::Outline(font) => SizedFace::Outline(font.as_scaled(px)),
                Typeface::Builtin => SizedFace::Builtin {
                    unit: px / builtin::EM_CELLS as f32,
                },
            }
        });

        let mut pb = PathBuilder::new();
        match face {
            SizedFace::Outline(font) => push_outline_text(&mut pb, font, text, left, top),
            SizedFace::Builtin { unit } => push_builtin_text(&mut pb, *unit, text, left, top),
        }
        pb.finish()
    }
}

fn push_outline_text(
    pb: &mut PathBuilder,
    font: &PxScaleFont<&FontVec>,
    text: &str,
    left: f32,
    top: f32,
) {
    let hs = font.h_scale_factor();
    let vs = font.v_scale_factor();
    let baseline = top + font.ascent();

    let mut pen = left;
    let mut previous: Option<GlyphId> = None;
    for ch in text.chars() {
        let id = font.glyph_id(ch);
        if let Some(prev) = previous {
            pen += font.kern(prev, id);
        }
        if let Some(outline) = font.font.outline(id) {
            let at = |p: ab_glyph::Point| (p.x.mul_add(hs, pen), (-p.y).mul_add(vs, baseline));
            let mut last: Option<ab_glyph::Point> = None;
            for curve in &outline.curves {
                let (start, end) = match *curve {
                    OutlineCurve::Line(a, b) => (a, b),
                    OutlineCurve::Quad(a, _, c) => (a, c),
                    OutlineCurve::Cubic(a, _, _, d) => (a, d),
                };
                if last != Some(start) {
                    if last.is_some() {
                        pb.close();
                    }
                    let (x, y) = at(start);
                    pb.move_to(x, y);
                }
                match *curve {
                    OutlineCurve::Line(_, b) => {
                        let (x, y) = at(b);
                        pb.line_to(x, y);
                    }
                    OutlineCurve::Quad(_, c1, b) => {
                        let ((x1, y1), (x, y)) = (at(c1), at(b));
                        pb.quad_to(x1, y1, x, y);
                    }
                    OutlineCurve::Cubic(_, c1, c2, b) => {
                        let ((x1, y1), (x2, y2), (x, y)) = (at(c1), at(c2), at(b));
                        pb.cubic_to(x1, y1, x2, y2, x, y);
                    }
                }
                last = Some(end);
            }
            if last.is_some() {
                pb.close();
            }
        }
        pen += font.h_advance(id);
        previous = Some(id);
    }
}

#[allow(clippy::cast_precision_loss)]
fn push_builtin_text(pb: &mut PathBuilder, unit: f32, text: &str, left: f32, top: f32) {
    let advance = builtin::ADVANCE_CELLS as f32 * unit;
    for (i, ch) in text.chars().enumerate() {
        let origin = (i as f32).mul_add(advance, left);
        for col in 0..builtin::GLYPH_COLUMNS {
            for row in 0..builtin::GLYPH_ROWS {
                if !builtin::is_set(ch, col, row) {
                    continue;
                }
                let x = (col as f32).mul_add(unit, origin);
                let y = (row as f32).mul_add(unit, top);
                if let Some(cell) = Rect::from_xywh(x, y, unit, unit) {
                    pb.push_rect(cell);
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_path_is_anchored_at_top_left() {
        let face = Typeface::Builtin;
        let mut cache = FontCache::new(&face);
        let path = cache.text_path("L", 16, 10.0, 20.0).unwrap();
        let bounds = path.bounds();
        // unit = 16 / 8 = 2; 'L' spans 5 columns and 7 rows.
        assert!((bounds.left() - 10.0).abs() < 1e-4);
        assert!((bounds.top() - 20.0).abs() < 1e-4);
        assert!((bounds.right() - 20.0).abs() < 1e-4);
        assert!((bounds.bottom() - 34.0).abs() < 1e-4);
    }

    #[test]
    fn builtin_text_advances_per_character() {
        let face = Typeface::Builtin;
        let mut cache = FontCache::new(&face);
        let one = cache.text_path("H", 8, 0.0, 0.0).unwrap().bounds();
        let two = cache.text_path("HH", 8, 0.0, 0.0).unwrap().bounds();
        assert!((two.right() - one.right() - 6.0).abs() < 1e-4);
    }

    #[test]
    fn blank_text_has_no_path() {
        let face = Typeface::Builtin;
        let mut cache = FontCache::new(&face);
        assert!(cache.text_path("   ", 12, 0.0, 0.0).is_none());
    }

    #[test]
    fn handles_are_cached_per_size() {
        let face = Typeface::Builtin;
        let mut cache = FontCache::new(&face);
        let _ = cache.text_path("A", 12, 0.0, 0.0);
        let _ = cache.text_path("B", 12, 5.0, 5.0);
        assert_eq!(cache.loaded_sizes(), 1);
        let _ = cache.text_path("C", 20, 0.0, 0.0);
        assert_eq!(cache.loaded_sizes(), 2);
    }

    #[test]
    fn builtin_source_never_fails() {
        assert!(matches!(BuiltinFace.typeface(), Typeface::Builtin));
    }
}
