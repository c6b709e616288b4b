//! Draw one styled word onto an RGB canvas.
//!
//! Each word is rendered into its own small premultiplied `Pixmap`
//! (outline first, then fill on top) and composited over the canvas.
//! The outline is centred on the glyph contour, so a `tiny-skia` stroke
//! of twice the raster thickness extends exactly that thickness outward.

use image::{Rgb, RgbImage};
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, Path, Pixmap, Stroke, Transform};

use super::style::OverlaySpec;

/// Stroke and fill `path` with the colours of `spec` onto `canvas`.
///
/// Parts of the word that fall outside the canvas are clipped.
pub fn draw_word(canvas: &mut RgbImage, path: &Path, spec: &OverlaySpec) {
    #[allow(clippy::cast_precision_loss)]
    let outline = spec.raster_stroke as f32;
    let bounds = path.bounds();

    let Some((x0, y0, x1, y1)) = clip_region(
        (
            bounds.left() - outline,
            bounds.top() - outline,
            bounds.right() + outline,
            bounds.bottom() + outline,
        ),
        canvas.dimensions(),
    ) else {
        return;
    };
    let Some(mut pixmap) = Pixmap::new(x1 - x0, y1 - y0) else {
        return;
    };

    #[allow(clippy::cast_precision_loss)]
    let transform = Transform::from_translate(-(x0 as f32), -(y0 as f32));

    let stroke = Stroke {
        width: outline * 2.0,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(path, &paint(spec.palette.stroke), &stroke, transform, None);
    pixmap.fill_path(
        path,
        &paint(spec.palette.fill),
        FillRule::Winding,
        transform,
        None,
    );

    composite(canvas, &pixmap, x0, y0);
}

fn paint(colour: Rgb<u8>) -> Paint<'static> {
    let [r, g, b] = colour.0;
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, 255);
    paint.anti_alias = true;
    paint
}

/// Integer pixel region covering `(left, top, right, bottom)`, clipped
/// to a canvas of `(width, height)`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clip_region(
    (left, top, right, bottom): (f32, f32, f32, f32),
    (width, height): (u32, u32),
) -> Option<(u32, u32, u32, u32)> {
    let clamp = |v: f32, limit: u32| v.clamp(0.0, limit as f32) as u32;
    let x0 = clamp(left.floor(), width);
    let y0 = clamp(top.floor(), height);
    let x1 = clamp(right.ceil(), width);
    let y1 = clamp(bottom.ceil(), height);
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Premultiplied source-over: `out = p + d * (255 - a) / 255`.
fn composite(canvas: &mut RgbImage, pixmap: &Pixmap, x0: u32, y0: u32) {
    let width = pixmap.width();
    for (i, px) in pixmap.pixels().iter().enumerate() {
        let a = u32::from(px.alpha());
        if a == 0 {
            continue;
        }
        #[allow(clippy::cast_possible_truncation)]
        let (dx, dy) = ((i as u32) % width, (i as u32) / width);
        let dst = canvas.get_pixel_mut(x0 + dx, y0 + dy);
        let src = [px.red(), px.green(), px.blue()];
        for (d, s) in dst.0.iter_mut().zip(src) {
            let mixed = (u32::from(s) * 255 + u32::from(*d) * (255 - a) + 127) / 255;
            #[allow(clippy::cast_possible_truncation)]
            let mixed = mixed.min(255) as u8;
            *d = mixed;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tiny_skia::{PathBuilder, Rect};

    use super::*;
    use crate::overlay::style::Palette;

    fn spec(palette: Palette, stroke: u32) -> OverlaySpec {
        OverlaySpec {
            text: "x".to_string(),
            left: 0,
            top: 0,
            baseline: 0,
            font_size: 10,
            palette,
            raster_stroke: stroke,
            vector_stroke: 1,
            luminance: 0.0,
        }
    }

    fn square(x: f32, y: f32, side: f32) -> Path {
        let mut pb = PathBuilder::new();
        pb.push_rect(Rect::from_xywh(x, y, side, side).unwrap());
        pb.finish().unwrap()
    }

    #[test]
    fn fill_covers_interior_and_stroke_surrounds_it() {
        let mut canvas = RgbImage::from_pixel(30, 30, Rgb([128, 128, 128]));
        draw_word(&mut canvas, &square(10.0, 10.0, 10.0), &spec(Palette::DARK_ON_LIGHT, 2));
        assert_eq!(canvas.get_pixel(15, 15).0, [10, 10, 10]);
        // Inside the 2 px outline band.
        assert_eq!(canvas.get_pixel(15, 8).0, [250, 250, 250]);
        // Well outside.
        assert_eq!(canvas.get_pixel(2, 2).0, [128, 128, 128]);
    }

    #[test]
    fn offscreen_parts_are_clipped() {
        let mut canvas = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        draw_word(&mut canvas, &square(5.0, 5.0, 20.0), &spec(Palette::LIGHT_ON_DARK, 1));
        assert_eq!(canvas.get_pixel(9, 9).0, [250, 250, 250]);
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn fully_offscreen_word_is_noop() {
        let mut canvas = RgbImage::from_pixel(10, 10, Rgb([7, 7, 7]));
        let before = canvas.clone();
        draw_word(&mut canvas, &square(50.0, 50.0, 5.0), &spec(Palette::LIGHT_ON_DARK, 1));
        assert_eq!(canvas, before);
    }

    #[test]
    fn clip_region_rounds_outward() {
        assert_eq!(
            clip_region((1.5, 2.2, 3.1, 4.9), (100, 100)),
            Some((1, 2, 4, 5))
        );
        assert_eq!(clip_region((-5.0, -5.0, -1.0, -1.0), (100, 100)), None);
    }
}
