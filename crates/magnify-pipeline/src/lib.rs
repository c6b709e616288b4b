//! magnify-pipeline: Pure image enlargement and text overlay (sans-IO).
//!
//! Turns one small input image into progressively larger variants:
//! a non-learned ×8 baseline, learned super-resolution passes behind a
//! pluggable backend, and a chained ×4→×2 enlargement. Recognized words
//! are then drawn back over the best variant with contrast-adaptive
//! styling.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! bitmaps and text. Model files, subprocesses, fonts on disk and the
//! output directory all live in `magnify-io`, behind the
//! [`ModelLocator`], [`SuperResolver`], [`OcrEngine`] and
//! [`TypefaceSource`] traits defined here.

pub mod blur;
pub mod clahe;
pub mod enhance;
pub mod manifest;
pub mod normalize;
pub mod ocr;
pub mod overlay;
pub mod resample;
pub mod stage;
pub mod superres;
pub mod traditional;
pub mod types;

pub use manifest::{Artifact, Manifest};
pub use ocr::{OcrEngine, OcrError, OcrRequest, OcrWord, parse_tsv};
pub use overlay::{OverlayRender, OverlaySpec, Palette, Typeface, TypefaceSource};
pub use stage::{PlannedStage, Requirement, StageName};
pub use superres::{ModelKind, ModelLocator, ModelSpec, ResolveError, SuperResolver, UpscaleError};
pub use traditional::TraditionalOutput;
pub use types::{
    Availability, Dimensions, Mode, PipelineConfig, PipelineError, RgbImage, TraditionalBackend,
};
