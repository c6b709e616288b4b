//! Non-learned enlargement: resample, then recover local contrast and
//! edge definition without inventing detail.
//!
//! The preferred backend equalizes luminance tile by tile and needs the
//! enlarged bitmap to be at least one tile-grid wide on each axis. Its
//! availability is probed before use; when the probe fails the basic
//! resample + sharpen + autocontrast sequence runs instead and the
//! reason is returned so the caller can surface it.

use image::RgbImage;
use tracing::debug;

use crate::clahe;
use crate::enhance;
use crate::resample::lanczos_upscale;
use crate::types::{Availability, Dimensions, PipelineConfig, TraditionalBackend};

/// Unsharp mask radius of the basic backend.
const BASIC_UNSHARP_RADIUS: f32 = 2.0;
/// Unsharp mask strength of the basic backend, in percent.
const BASIC_UNSHARP_PERCENT: u32 = 180;
/// Unsharp mask threshold of the basic backend.
const BASIC_UNSHARP_THRESHOLD: u8 = 3;
/// Histogram percentage trimmed from each end by autocontrast.
const BASIC_AUTOCONTRAST_CUTOFF: f64 = 1.0;
/// Global contrast boost of the basic backend.
const BASIC_CONTRAST: f64 = 1.12;
/// Sharpness boost of the basic backend.
const BASIC_SHARPNESS: f64 = 1.08;

/// Output of the traditional stage.
#[derive(Debug, Clone)]
pub struct TraditionalOutput {
    /// The enlarged, enhanced bitmap.
    pub image: RgbImage,
    /// The backend that actually ran.
    pub backend: TraditionalBackend,
    /// Why the configured backend was not used, if it was not.
    pub fallback_reason: Option<String>,
}

/// Whether `backend` can process a bitmap that will be `upscaled` in
/// size once resampled.
#[must_use]
pub fn probe(
    backend: TraditionalBackend,
    upscaled: Dimensions,
    config: &PipelineConfig,
) -> Availability {
    match backend {
        TraditionalBackend::Basic => Availability::Available,
        TraditionalBackend::Clahe => {
            if clahe::can_tile(upscaled, config.clahe_tile_grid) {
                Availability::Available
            } else {
                Availability::Unavailable(format!(
                    "{upscaled} is smaller than the {grid}×{grid} equalization grid",
                    grid = config.clahe_tile_grid
                ))
            }
        }
    }
}

/// Enlarge `image` by the configured traditional factor.
///
/// Never needs a learned model and never fails: the configured backend
/// is probed and the basic sequence substitutes for it when unavailable.
#[must_use = "returns the enlarged image"]
pub fn upscale(image: &RgbImage, config: &PipelineConfig) -> TraditionalOutput {
    let factor = config.traditional_factor;
    let target = Dimensions::of(image).scaled(factor);

    let (backend, fallback_reason) = match probe(config.traditional_backend, target, config) {
        Availability::Available => (config.traditional_backend, None),
        Availability::Unavailable(reason) => (TraditionalBackend::Basic, Some(reason)),
    };
    debug!(%backend, factor, %target, "traditional upscale");

    let resampled = lanczos_upscale(image, factor);
    let image = match backend {
        TraditionalBackend::Clahe => {
            let equalized = clahe::equalize_luminance(
                &resampled,
                config.clahe_clip_limit,
                config.clahe_tile_grid,
            );
            enhance::unsharp_blend(&equalized, config.unsharp_sigma, config.unsharp_amount)
        }
        TraditionalBackend::Basic => basic_enhance(&resampled),
    };

    TraditionalOutput {
        image,
        backend,
        fallback_reason,
    }
}

/// The basic enhancement chain applied to an already resampled bitmap.
#[must_use = "returns the enhanced image"]
pub fn basic_enhance(resampled: &RgbImage) -> RgbImage {
    let sharpened = enhance::unsharp_mask(
        resampled,
        BASIC_UNSHARP_RADIUS,
        BASIC_UNSHARP_PERCENT,
        BASIC_UNSHARP_THRESHOLD,
    );
    let stretched = enhance::autocontrast(&sharpened, BASIC_AUTOCONTRAST_CUTOFF);
    let contrasted = enhance::adjust_contrast(&stretched, BASIC_CONTRAST);
    enhance::adjust_sharpness(&contrasted, BASIC_SHARPNESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x * 9 % 256) as u8, (y * 17 % 256) as u8, ((x ^ y) * 5 % 256) as u8])
        })
    }

    #[test]
    fn default_output_is_eight_times_larger() {
        let out = upscale(&sample(20, 10), &PipelineConfig::default());
        assert_eq!(out.image.dimensions(), (160, 80));
        assert_eq!(out.backend, TraditionalBackend::Clahe);
        assert!(out.fallback_reason.is_none());
    }

    #[test]
    fn tiny_input_falls_back_to_basic() {
        // 1×1 ×8 = 8×8, smaller than the 10×10 grid.
        let out = upscale(&sample(1, 1), &PipelineConfig::default());
        assert_eq!(out.image.dimensions(), (8, 8));
        assert_eq!(out.backend, TraditionalBackend::Basic);
        assert!(out.fallback_reason.is_some());
    }

    #[test]
    fn basic_backend_when_configured() {
        let config = PipelineConfig {
            traditional_backend: TraditionalBackend::Basic,
            ..PipelineConfig::default()
        };
        let out = upscale(&sample(6, 4), &config);
        assert_eq!(out.image.dimensions(), (48, 32));
        assert_eq!(out.backend, TraditionalBackend::Basic);
        assert!(out.fallback_reason.is_none());
    }

    #[test]
    fn probe_reports_reason() {
        let dims = Dimensions {
            width: 9,
            height: 40,
        };
        let clahe = probe(TraditionalBackend::Clahe, dims, &PipelineConfig::default());
        assert!(matches!(clahe, Availability::Unavailable(ref r) if r.contains("9×40")));
        assert!(probe(TraditionalBackend::Basic, dims, &PipelineConfig::default()).is_available());
    }

    #[test]
    fn upscale_is_deterministic() {
        let img = sample(12, 9);
        let config = PipelineConfig::default();
        assert_eq!(upscale(&img, &config).image, upscale(&img, &config).image);
    }
}
