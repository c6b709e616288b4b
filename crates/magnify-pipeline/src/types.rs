//! Shared types for the magnify enlargement pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` so downstream crates can pass bitmaps around
/// without depending on `image` directly.
///
/// Every stage produces a fresh `RgbImage`; nothing in the pipeline
/// mutates a bitmap once another stage can observe it.
pub use image::RgbImage;

/// Re-export `Rgb` for colour constants shared with the serializers.
pub use image::Rgb;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing bitmap.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Dimensions multiplied by an integer factor on both axes.
    #[must_use]
    pub const fn scaled(self, factor: u32) -> Self {
        Self {
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

/// Named preset selecting which stages of the pipeline execute.
///
/// See [`Mode::plan`](crate::stage) for the fixed mode-to-stage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Traditional, quality ×4, optional fast ×4, chained ×8, overlay.
    #[default]
    BestText,
    /// Traditional and the quality learned ×4 pass.
    Quality,
    /// Traditional and the fast learned ×4 pass.
    Fast,
    /// Traditional only; never needs a learned model.
    Traditional,
}

impl Mode {
    /// Every mode, in CLI listing order.
    pub const ALL: [Self; 4] = [Self::BestText, Self::Quality, Self::Fast, Self::Traditional];

    /// The kebab-case name used on the command line and in manifests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BestText => "best-text",
            Self::Quality => "quality",
            Self::Fast => "fast",
            Self::Traditional => "traditional",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("unknown mode '{s}'")))
    }
}

/// Which enhancement sequence the traditional upscale uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraditionalBackend {
    /// Lanczos resample, tile-wise contrast-limited equalization of the
    /// luminance channel, then Gaussian unsharp blending.
    #[default]
    Clahe,
    /// Lanczos resample, unsharp mask, autocontrast, contrast and
    /// sharpness boosts. Always available.
    Basic,
}

impl fmt::Display for TraditionalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clahe => f.write_str("clahe"),
            Self::Basic => f.write_str("basic"),
        }
    }
}

/// Result of probing an optional capability before using it.
///
/// Call sites branch on the probe instead of relying on a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// The capability can be used.
    Available,
    /// The capability cannot be used, with a human-readable reason.
    Unavailable(String),
}

impl Availability {
    /// Returns `true` for [`Availability::Available`].
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

/// Configuration for the enlargement pipeline.
///
/// Every field has a default matching the reference behaviour; the
/// constants are exposed so CLI defaults cannot silently diverge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Which stages to run.
    pub mode: Mode,

    /// Integer super-sampling factor of the traditional stage.
    pub traditional_factor: u32,

    /// Preferred traditional enhancement sequence.
    pub traditional_backend: TraditionalBackend,

    /// Contrast-limited equalization clip limit (multiples of the mean
    /// histogram bin height).
    pub clahe_clip_limit: f32,

    /// Number of equalization tiles along each axis.
    pub clahe_tile_grid: u32,

    /// Gaussian sigma of the unsharp blend.
    pub unsharp_sigma: f32,

    /// Weight `k` in `base*k - blurred*(k-1)`. Must be greater than 1.
    pub unsharp_amount: f32,

    /// Colour transparent pixels are composited over.
    pub background: [u8; 3],

    /// OCR language code passed to the recognizer.
    pub ocr_language: String,

    /// OCR page-segmentation mode passed to the recognizer.
    pub ocr_page_segmentation: u32,

    /// Words below this confidence (0-100) are discarded.
    pub ocr_min_confidence: f64,

    /// Smallest overlay font size in pixels.
    pub min_font_size: u32,
}

impl PipelineConfig {
    /// Default mode.
    pub const DEFAULT_MODE: Mode = Mode::BestText;
    /// Default traditional factor.
    pub const DEFAULT_TRADITIONAL_FACTOR: u32 = 8;
    /// Default equalization clip limit.
    pub const DEFAULT_CLAHE_CLIP_LIMIT: f32 = 2.0;
    /// Default equalization tile grid.
    pub const DEFAULT_CLAHE_TILE_GRID: u32 = 10;
    /// Default unsharp sigma.
    pub const DEFAULT_UNSHARP_SIGMA: f32 = 1.2;
    /// Default unsharp weight.
    pub const DEFAULT_UNSHARP_AMOUNT: f32 = 1.8;
    /// Default background (white).
    pub const DEFAULT_BACKGROUND: [u8; 3] = [255, 255, 255];
    /// Default OCR language.
    pub const DEFAULT_OCR_LANGUAGE: &str = "eng";
    /// Default OCR page-segmentation mode (uniform block of text).
    pub const DEFAULT_OCR_PAGE_SEGMENTATION: u32 = 6;
    /// Default minimum OCR confidence.
    pub const DEFAULT_OCR_MIN_CONFIDENCE: f64 = 70.0;
    /// Default minimum overlay font size.
    pub const DEFAULT_MIN_FONT_SIZE: u32 = 10;

    /// Check the invariants the stages rely on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.traditional_factor == 0 {
            return Err(PipelineError::InvalidConfig(
                "traditional_factor must be at least 1".to_string(),
            ));
        }
        if self.clahe_tile_grid == 0 {
            return Err(PipelineError::InvalidConfig(
                "clahe_tile_grid must be at least 1".to_string(),
            ));
        }
        if !(self.clahe_clip_limit > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "clahe_clip_limit must be positive, got {}",
                self.clahe_clip_limit
            )));
        }
        if !(self.unsharp_amount > 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "unsharp_amount must be greater than 1, got {}",
                self.unsharp_amount
            )));
        }
        if !(0.0..=100.0).contains(&self.ocr_min_confidence) {
            return Err(PipelineError::InvalidConfig(format!(
                "ocr_min_confidence must be within 0-100, got {}",
                self.ocr_min_confidence
            )));
        }
        if self.ocr_language.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "ocr_language must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The background colour as a pixel.
    #[must_use]
    pub const fn background_pixel(&self) -> Rgb<u8> {
        Rgb(self.background)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Self::DEFAULT_MODE,
            traditional_factor: Self::DEFAULT_TRADITIONAL_FACTOR,
            traditional_backend: TraditionalBackend::default(),
            clahe_clip_limit: Self::DEFAULT_CLAHE_CLIP_LIMIT,
            clahe_tile_grid: Self::DEFAULT_CLAHE_TILE_GRID,
            unsharp_sigma: Self::DEFAULT_UNSHARP_SIGMA,
            unsharp_amount: Self::DEFAULT_UNSHARP_AMOUNT,
            background: Self::DEFAULT_BACKGROUND,
            ocr_language: Self::DEFAULT_OCR_LANGUAGE.to_string(),
            ocr_page_segmentation: Self::DEFAULT_OCR_PAGE_SEGMENTATION,
            ocr_min_confidence: Self::DEFAULT_OCR_MIN_CONFIDENCE,
            min_font_size: Self::DEFAULT_MIN_FONT_SIZE,
        }
    }
}

/// Errors raised by the pure pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_factor_is_rejected() {
        let config = PipelineConfig {
            traditional_factor: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn unsharp_amount_must_exceed_one() {
        let config = PipelineConfig {
            unsharp_amount: 1.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn confidence_outside_range_is_rejected() {
        let config = PipelineConfig {
            ocr_min_confidence: 101.0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn mode_round_trips_through_str() {
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        assert!("turbo".parse::<Mode>().is_err());
    }

    #[test]
    fn config_deserializes_partial_json() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"mode":"traditional","min_font_size":14}"#).unwrap();
        assert_eq!(config.mode, Mode::Traditional);
        assert_eq!(config.min_font_size, 14);
        assert_eq!(
            config.traditional_factor,
            PipelineConfig::DEFAULT_TRADITIONAL_FACTOR
        );
    }

    #[test]
    fn dimensions_scale_and_display() {
        let dims = Dimensions {
            width: 100,
            height: 50,
        };
        assert_eq!(
            dims.scaled(8),
            Dimensions {
                width: 800,
                height: 400
            }
        );
        assert_eq!(dims.to_string(), "100×50");
    }
}
