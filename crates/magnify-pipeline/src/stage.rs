//! The fixed mode-to-stage table and per-stage metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::superres::ModelKind;
use crate::types::Mode;

/// A named step of the pipeline that can produce an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    /// Non-learned ×8 upscale.
    Traditional,
    /// Learned ×4 with the quality backend.
    QualityX4,
    /// Learned ×4 with the fast backend.
    FastX4,
    /// Quality ×4 output fed through a ×2 pass.
    ChainedX8,
    /// Recognized text drawn over the best intermediate.
    Overlay,
}

/// Whether a stage failing aborts the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Requirement {
    /// Failure is fatal.
    Required,
    /// Failure is recorded as a warning and the run continues.
    Optional,
}

/// One row of a mode's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStage {
    /// The stage to run.
    pub name: StageName,
    /// Whether its failure is fatal.
    pub requirement: Requirement,
}

const fn required(name: StageName) -> PlannedStage {
    PlannedStage {
        name,
        requirement: Requirement::Required,
    }
}

const fn optional(name: StageName) -> PlannedStage {
    PlannedStage {
        name,
        requirement: Requirement::Optional,
    }
}

const TRADITIONAL_PLAN: &[PlannedStage] = &[required(StageName::Traditional)];

const FAST_PLAN: &[PlannedStage] = &[
    required(StageName::Traditional),
    required(StageName::FastX4),
];

const QUALITY_PLAN: &[PlannedStage] = &[
    required(StageName::Traditional),
    required(StageName::QualityX4),
];

const BEST_TEXT_PLAN: &[PlannedStage] = &[
    required(StageName::Traditional),
    required(StageName::QualityX4),
    optional(StageName::FastX4),
    required(StageName::ChainedX8),
    optional(StageName::Overlay),
];

/// Candidate OCR sources, most preferred first.
pub const OCR_SOURCE_PREFERENCE: [StageName; 4] = [
    StageName::ChainedX8,
    StageName::QualityX4,
    StageName::FastX4,
    StageName::Traditional,
];

impl Mode {
    /// The ordered stages this mode runs. Never empty.
    #[must_use]
    pub const fn plan(self) -> &'static [PlannedStage] {
        match self {
            Self::Traditional => TRADITIONAL_PLAN,
            Self::Fast => FAST_PLAN,
            Self::Quality => QUALITY_PLAN,
            Self::BestText => BEST_TEXT_PLAN,
        }
    }

    /// The requirement of `stage` in this mode, or `None` if the mode
    /// does not run it.
    #[must_use]
    pub fn requirement(self, stage: StageName) -> Option<Requirement> {
        self.plan()
            .iter()
            .find(|planned| planned.name == stage)
            .map(|planned| planned.requirement)
    }
}

impl StageName {
    /// Stable artifact file name. The traditional name assumes the default
    /// factor and the overlay's depends on the scale of its source; see
    /// [`traditional_file_name`] and [`overlay_file_names`].
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Traditional => "traditional_x8.png",
            Self::QualityX4 => "ai_edsr_x4.png",
            Self::FastX4 => "ai_fsrcnn_x4.png",
            Self::ChainedX8 => "ai_pipeline_x8.png",
            Self::Overlay => "ocr_overlay.png",
        }
    }

    /// Manifest label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Traditional => "Traditional CLAHE+Unsharp ×8",
            Self::QualityX4 => "AI Super-Resolution EDSR ×4",
            Self::FastX4 => "AI Super-Resolution FSRCNN ×4",
            Self::ChainedX8 => "AI Pipeline ×8 (EDSR×4 → ×2)",
            Self::Overlay => "OCR Text Overlay",
        }
    }

    /// Manifest note.
    #[must_use]
    pub const fn note(self) -> &'static str {
        match self {
            Self::Traditional => "Fast baseline (no hallucinated detail)",
            Self::QualityX4 => "Best quality (CPU, heavy RAM)",
            Self::FastX4 => "Fast / low memory",
            Self::ChainedX8 => "Bigger base for OCR",
            Self::Overlay => "Best readability for small text",
        }
    }

    /// The learned model a learned stage runs, if any. The chained
    /// stage's first step reuses the quality output, so this is its
    /// second, small-factor model.
    #[must_use]
    pub const fn model(self) -> Option<ModelKind> {
        match self {
            Self::QualityX4 => Some(ModelKind::EdsrX4),
            Self::FastX4 => Some(ModelKind::FsrcnnX4),
            Self::ChainedX8 => Some(ModelKind::FsrcnnX2),
            Self::Traditional | Self::Overlay => None,
        }
    }

    /// Enlargement of this stage's output relative to the normalized
    /// input, given the traditional factor in use.
    #[must_use]
    pub const fn effective_scale(self, traditional_factor: u32) -> u32 {
        match self {
            Self::Traditional => traditional_factor,
            Self::QualityX4 | Self::FastX4 => 4,
            Self::ChainedX8 => 8,
            Self::Overlay => 0,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Traditional => f.write_str("traditional"),
            Self::QualityX4 => f.write_str("quality-x4"),
            Self::FastX4 => f.write_str("fast-x4"),
            Self::ChainedX8 => f.write_str("chained-x8"),
            Self::Overlay => f.write_str("overlay"),
        }
    }
}

/// Raster and vector file names of an overlay drawn on a source
/// enlarged `scale` times.
#[must_use]
pub fn overlay_file_names(scale: u32) -> (String, String) {
    (
        format!("ocr_overlay_x{scale}.png"),
        format!("ocr_overlay_x{scale}_text.svg"),
    )
}

/// Manifest label of an overlay drawn on a source enlarged `scale` times.
#[must_use]
pub fn overlay_label(scale: u32) -> String {
    format!("{} ×{scale}", StageName::Overlay.label())
}

/// File name of a traditional enlargement by `factor`.
#[must_use]
pub fn traditional_file_name(factor: u32) -> String {
    format!("traditional_x{factor}.png")
}

/// Manifest label of a traditional enlargement by `factor`.
#[must_use]
pub fn traditional_label(factor: u32) -> String {
    format!("Traditional CLAHE+Unsharp ×{factor}")
}

/// Manifest note of a chained stage whose ×2 step was a resample.
pub const CHAINED_FALLBACK_NOTE: &str = "Bigger base for OCR (×2 step resampled, no FSRCNN ×2)";

#[cfg(test)]
mod tests {
    use super::*;

    fn names(mode: Mode) -> Vec<StageName> {
        mode.plan().iter().map(|p| p.name).collect()
    }

    #[test]
    fn mode_table_matches_reference() {
        use StageName::*;
        assert_eq!(names(Mode::Traditional), vec![Traditional]);
        assert_eq!(names(Mode::Fast), vec![Traditional, FastX4]);
        assert_eq!(names(Mode::Quality), vec![Traditional, QualityX4]);
        assert_eq!(
            names(Mode::BestText),
            vec![Traditional, QualityX4, FastX4, ChainedX8, Overlay]
        );
    }

    #[test]
    fn every_mode_starts_with_required_traditional() {
        for mode in Mode::ALL {
            let first = mode.plan().first().copied();
            assert_eq!(first, Some(required(StageName::Traditional)));
        }
    }

    #[test]
    fn best_text_optional_stages() {
        assert_eq!(
            Mode::BestText.requirement(StageName::FastX4),
            Some(Requirement::Optional)
        );
        assert_eq!(
            Mode::BestText.requirement(StageName::QualityX4),
            Some(Requirement::Required)
        );
        assert_eq!(Mode::Fast.requirement(StageName::FastX4), Some(Requirement::Required));
        assert_eq!(Mode::Quality.requirement(StageName::Overlay), None);
    }

    #[test]
    fn overlay_runs_only_in_best_text() {
        for mode in Mode::ALL {
            assert_eq!(
                mode.requirement(StageName::Overlay).is_some(),
                mode == Mode::BestText
            );
        }
    }

    #[test]
    fn overlay_names_include_scale() {
        let (png, svg) = overlay_file_names(8);
        assert_eq!(png, "ocr_overlay_x8.png");
        assert_eq!(svg, "ocr_overlay_x8_text.svg");
        assert_eq!(overlay_label(4), "OCR Text Overlay ×4");
    }

    #[test]
    fn traditional_names_follow_factor() {
        assert_eq!(traditional_file_name(8), StageName::Traditional.file_name());
        assert_eq!(traditional_label(8), StageName::Traditional.label());
        assert_eq!(traditional_file_name(4), "traditional_x4.png");
        assert_eq!(traditional_label(4), "Traditional CLAHE+Unsharp ×4");
    }

    #[test]
    fn chained_stage_uses_small_model() {
        assert_eq!(StageName::ChainedX8.model(), Some(ModelKind::FsrcnnX2));
        assert_eq!(StageName::ChainedX8.effective_scale(8), 8);
    }
}
