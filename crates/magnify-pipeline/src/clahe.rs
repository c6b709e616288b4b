//! Contrast-limited adaptive histogram equalization on luminance.
//!
//! The image is cut into a `grid × grid` array of tiles. Each tile gets
//! its own clipped-histogram lookup table; every pixel is mapped through
//! the four nearest tile tables and the results are blended bilinearly
//! by distance to the tile centres.
//!
//! Colour images are equalized on the Y channel of full-range BT.601
//! YCbCr only. Chroma is recomputed in floating point from each source
//! pixel so a grey input stays grey and hues do not shift.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::types::Dimensions;

const BINS: usize = 256;

/// Whether a bitmap of `dims` can be cut into `grid` non-empty tiles on
/// each axis.
#[must_use]
pub const fn can_tile(dims: Dimensions, grid: u32) -> bool {
    grid > 0 && dims.width >= grid && dims.height >= grid
}

/// Equalize a grey image tile by tile.
///
/// `clip_limit` is a multiple of the mean bin height; the absolute
/// clip for a tile is `max(1, clip_limit * area / 256)`. Callers must
/// check [`can_tile`] first; an untileable image is returned unchanged.
#[must_use = "returns the equalized image"]
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if !can_tile(Dimensions { width: w, height: h }, grid) {
        return image.clone();
    }

    let xs = boundaries(w, grid);
    let ys = boundaries(h, grid);

    let mut luts: Vec<[u8; BINS]> = Vec::with_capacity((grid * grid) as usize);
    for ty in 0..grid as usize {
        for tx in 0..grid as usize {
            let mut hist = [0_u32; BINS];
            for y in ys[ty]..ys[ty + 1] {
                for x in xs[tx]..xs[tx + 1] {
                    hist[usize::from(image.get_pixel(x, y).0[0])] += 1;
                }
            }
            let area = (xs[tx + 1] - xs[tx]) * (ys[ty + 1] - ys[ty]);
            luts.push(tile_lut(&mut hist, area, clip_limit));
        }
    }

    let tile_w = f64::from(w) / f64::from(grid);
    let tile_h = f64::from(h) / f64::from(grid);
    let lut = |tx: usize, ty: usize| &luts[ty * grid as usize + tx];

    GrayImage::from_fn(w, h, |x, y| {
        let (tx0, tx1, wx) = neighbours(x, tile_w, grid);
        let (ty0, ty1, wy) = neighbours(y, tile_h, grid);
        let v = usize::from(image.get_pixel(x, y).0[0]);

        let top = f64::from(lut(tx0, ty0)[v]).mul_add(1.0 - wx, f64::from(lut(tx1, ty0)[v]) * wx);
        let bottom =
            f64::from(lut(tx0, ty1)[v]).mul_add(1.0 - wx, f64::from(lut(tx1, ty1)[v]) * wx);
        Luma([to_u8(top.mul_add(1.0 - wy, bottom * wy))])
    })
}

/// Equalize the luminance of an RGB bitmap, preserving chroma.
///
/// Chroma is recomputed from the source pixel on output, so only the
/// 8-bit luma plane is held alongside the input.
#[must_use = "returns the equalized image"]
pub fn equalize_luminance(image: &RgbImage, clip_limit: f32, grid: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let luma = GrayImage::from_fn(w, h, |x, y| Luma([to_u8(to_ycbcr(image.get_pixel(x, y).0)[0])]));
    let equalized = clahe(&luma, clip_limit, grid);

    RgbImage::from_fn(w, h, |x, y| {
        let [_, cb, cr] = to_ycbcr(image.get_pixel(x, y).0);
        Rgb(from_ycbcr(f64::from(equalized.get_pixel(x, y).0[0]), cb, cr))
    })
}

/// Clip the histogram, spread the excess evenly, and build the mapping.
fn tile_lut(hist: &mut [u32; BINS], area: u32, clip_limit: f32) -> [u8; BINS] {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clip = ((f64::from(clip_limit) * f64::from(area) / BINS as f64) as u32).max(1);

    let mut excess = 0_u32;
    for bin in hist.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }
    let share = excess / BINS as u32;
    let remainder = (excess % BINS as u32) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let mut lut = [0_u8; BINS];
    let mut cdf = 0_u32;
    for (slot, bin) in lut.iter_mut().zip(hist.iter()) {
        cdf += bin;
        *slot = to_u8(f64::from(cdf) * 255.0 / f64::from(area));
    }
    lut
}

/// Integer tile edges: tile `t` spans `[b[t], b[t+1])`.
fn boundaries(len: u32, grid: u32) -> Vec<u32> {
    (0..=grid)
        .map(|t| {
            #[allow(clippy::cast_possible_truncation)]
            let edge = (u64::from(t) * u64::from(len) / u64::from(grid)) as u32;
            edge
        })
        .collect()
}

/// The two tiles bracketing `pos` along one axis and the weight of the
/// second one.
fn neighbours(pos: u32, tile_len: f64, grid: u32) -> (usize, usize, f64) {
    let g = (f64::from(pos) + 0.5) / tile_len - 0.5;
    let last = grid as usize - 1;
    if g <= 0.0 {
        return (0, 0, 0.0);
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let t0 = g.floor() as usize;
    if t0 >= last {
        return (last, last, 0.0);
    }
    (t0, t0 + 1, g - g.floor())
}

fn to_ycbcr([r, g, b]: [u8; 3]) -> [f64; 3] {
    let (r, g, b) = (f64::from(r), f64::from(g), f64::from(b));
    [
        0.299 * r + 0.587 * g + 0.114 * b,
        128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b,
        128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b,
    ]
}

fn from_ycbcr(y: f64, cb: f64, cr: f64) -> [u8; 3] {
    let (cb, cr) = (cb - 128.0, cr - 128.0);
    [
        to_u8(1.402_f64.mul_add(cr, y)),
        to_u8(0.714_136_f64.mul_add(-cr, 0.344_136_f64.mul_add(-cb, y))),
        to_u8(1.772_f64.mul_add(cb, y)),
    ]
}

/// Round and clamp to the 0-255 range.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn to_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, _| Luma([100 + (x / 2) as u8]))
    }

    #[test]
    fn can_tile_requires_grid_pixels_per_axis() {
        let dims = Dimensions {
            width: 10,
            height: 9,
        };
        assert!(!can_tile(dims, 10));
        assert!(can_tile(dims, 9));
        assert!(!can_tile(dims, 0));
    }

    #[test]
    fn untileable_image_is_unchanged() {
        let img = gradient(4, 4);
        assert_eq!(clahe(&img, 2.0, 10), img);
    }

    #[test]
    fn boundaries_cover_every_pixel() {
        let b = boundaries(23, 10);
        assert_eq!(b.first(), Some(&0));
        assert_eq!(b.last(), Some(&23));
        assert!(b.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn low_contrast_gradient_is_stretched() {
        let img = gradient(40, 40);
        let out = clahe(&img, 2.0, 2);
        let min = out.pixels().map(|p| p.0[0]).min().unwrap_or(0);
        let max = out.pixels().map(|p| p.0[0]).max().unwrap_or(0);
        assert!(max - min > 19, "range {min}..{max} not stretched");
    }

    #[test]
    fn clipped_histogram_keeps_total_mass() {
        let mut hist = [0_u32; BINS];
        hist[7] = 1000;
        hist[200] = 24;
        let lut = tile_lut(&mut hist, 1024, 2.0);
        assert_eq!(hist.iter().sum::<u32>(), 1024);
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn grey_input_stays_grey() {
        let img = RgbImage::from_fn(30, 30, |x, y| {
            let v = ((x + y) * 3) as u8;
            Rgb([v, v, v])
        });
        let out = equalize_luminance(&img, 2.0, 3);
        for p in out.pixels() {
            let [r, g, b] = p.0;
            assert!(r.abs_diff(g) <= 1 && g.abs_diff(b) <= 1, "{:?}", p.0);
        }
    }

    #[test]
    fn chroma_follows_each_source_pixel() {
        let img = RgbImage::from_fn(20, 20, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([120, 130, 150])
            } else {
                Rgb([150, 130, 120])
            }
        });
        let out = equalize_luminance(&img, 2.0, 2);
        for (x, y, p) in out.enumerate_pixels() {
            let [_, cb_in, cr_in] = to_ycbcr(img.get_pixel(x, y).0);
            let [_, cb_out, cr_out] = to_ycbcr(p.0);
            assert!((cb_in - cb_out).abs() <= 2.0, "cb at ({x}, {y})");
            assert!((cr_in - cr_out).abs() <= 2.0, "cr at ({x}, {y})");
        }
    }

    #[test]
    fn ycbcr_round_trip_is_lossless_for_opaque_colours() {
        for rgb in [[0, 0, 0], [255, 255, 255], [12, 200, 99], [250, 3, 128]] {
            let [y, cb, cr] = to_ycbcr(rgb);
            assert_eq!(from_ycbcr(y, cb, cr), rgb);
        }
    }
}
