//! Run orchestration: advance one input through the mode's stage plan.
//!
//! [`Run::new`] returns a [`Pending`] run. Each state consumes `self` and
//! yields the next, persisting artifacts through the [`ArtifactWriter`]
//! as stages complete:
//!
//! ```text
//! Pending → Normalized → BaselineDone → LearnedDone → ChainedDone → OverlayDone → RunReport
//! ```
//!
//! States whose stages are not in the active mode's plan pass straight
//! through. Optional stage failures become warnings; required stage
//! failures end the run with [`RunError::RequiredStage`].

use std::path::PathBuf;

use magnify_pipeline::stage::{self, CHAINED_FALLBACK_NOTE, OCR_SOURCE_PREFERENCE};
use magnify_pipeline::{
    Artifact, Availability, Dimensions, Manifest, Mode, ModelKind, ModelLocator, OcrEngine,
    OcrRequest, PipelineConfig, PipelineError, PlannedStage, Requirement, RgbImage, StageName,
    SuperResolver, TypefaceSource, UpscaleError,
};
use tracing::{info, warn};

use crate::writer::{ArtifactError, ArtifactWriter};

/// Failure that ends a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Input could not be decoded or the configuration is invalid.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A stage the mode cannot do without failed.
    #[error("required stage {stage} failed: {source}")]
    RequiredStage {
        /// The failing stage.
        stage: StageName,
        /// What went wrong.
        source: UpscaleError,
    },

    /// An artifact could not be written.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// The external capabilities a run depends on.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    /// Finds learned model files.
    pub models: &'a dyn ModelLocator,
    /// Runs learned inference.
    pub super_resolver: &'a dyn SuperResolver,
    /// Recognizes text for the overlay.
    pub ocr: &'a dyn OcrEngine,
    /// Supplies the overlay face.
    pub fonts: &'a dyn TypefaceSource,
}

impl std::fmt::Debug for Collaborators<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// How a planned stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage wrote `file`.
    Produced {
        /// Artifact file name.
        file: String,
    },
    /// The stage wrote `file` using a substitute method.
    Fallback {
        /// Artifact file name.
        file: String,
        /// Why the preferred method was not used.
        reason: String,
    },
    /// The stage produced nothing.
    Skipped {
        /// Why.
        reason: String,
    },
}

/// One entry per planned stage, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    /// Which stage.
    pub name: StageName,
    /// Whether the mode needed it.
    pub requirement: Requirement,
    /// What happened.
    pub status: StageStatus,
}

impl StageOutcome {
    /// The file written, if any.
    #[must_use]
    pub fn file(&self) -> Option<&str> {
        match &self.status {
            StageStatus::Produced { file } | StageStatus::Fallback { file, .. } => Some(file),
            StageStatus::Skipped { .. } => None,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The mode that ran.
    pub mode: Mode,
    /// Size of the normalized input.
    pub dimensions: Dimensions,
    /// Every recorded artifact, in completion order.
    pub manifest: Manifest,
    /// Outcome of each planned stage.
    pub stages: Vec<StageOutcome>,
    /// Non-fatal conditions, in the order they occurred.
    pub warnings: Vec<String>,
    /// The run's output directory.
    pub output_dir: PathBuf,
    /// `manifest.json`.
    pub manifest_path: PathBuf,
    /// `compare.html`.
    pub compare_path: PathBuf,
    /// The vector twin of the overlay, when one was written.
    pub overlay_svg: Option<PathBuf>,
}

struct Produced {
    stage: StageName,
    image: RgbImage,
    path: PathBuf,
}

/// State shared by every run stage.
struct Context<'a> {
    config: PipelineConfig,
    writer: ArtifactWriter,
    collaborators: Collaborators<'a>,
    produced: Vec<Produced>,
    stages: Vec<StageOutcome>,
    warnings: Vec<String>,
    overlay_svg: Option<PathBuf>,
}

impl Context<'_> {
    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn planned(&self, name: StageName) -> Option<PlannedStage> {
        self.config
            .mode
            .plan()
            .iter()
            .copied()
            .find(|planned| planned.name == name)
    }

    fn output(&self, name: StageName) -> Option<&Produced> {
        self.produced.iter().find(|p| p.stage == name)
    }

    /// Persist a stage bitmap and keep it for later stages.
    fn record(
        &mut self,
        planned: PlannedStage,
        artifact: Artifact,
        image: RgbImage,
        fallback: Option<String>,
    ) -> Result<(), RunError> {
        let file = artifact.file.clone();
        let path = self.writer.persist_image(artifact, &image)?;
        let status = match fallback {
            None => StageStatus::Produced { file },
            Some(reason) => StageStatus::Fallback { file, reason },
        };
        self.stages.push(StageOutcome {
            name: planned.name,
            requirement: planned.requirement,
            status,
        });
        self.produced.push(Produced {
            stage: planned.name,
            image,
            path,
        });
        Ok(())
    }

    fn skip(&mut self, planned: PlannedStage, reason: String) {
        self.warn(format!("{} skipped: {reason}", planned.name));
        self.stages.push(StageOutcome {
            name: planned.name,
            requirement: planned.requirement,
            status: StageStatus::Skipped { reason },
        });
    }

    fn learned(&self, input: &RgbImage, kind: ModelKind) -> Result<RgbImage, UpscaleError> {
        magnify_pipeline::superres::run_learned(
            input,
            kind,
            self.collaborators.models,
            self.collaborators.super_resolver,
        )
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// A run that has not touched its input yet.
#[must_use = "run stages are consumed by advancing — call .normalize() to continue"]
pub struct Pending<'a> {
    source: Vec<u8>,
    ctx: Context<'a>,
}

impl<'a> Pending<'a> {
    /// Validate the configuration, decode and flatten the input, and
    /// write `original.png`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Pipeline`] for an invalid configuration or an
    /// undecodable input, and [`RunError::Artifact`] if the normalized
    /// image cannot be written.
    pub fn normalize(self) -> Result<Normalized<'a>, RunError> {
        let Self { source, mut ctx } = self;
        ctx.config.validate()?;
        let original =
            magnify_pipeline::normalize::normalize(&source, ctx.config.background_pixel())?;
        let dimensions = Dimensions::of(&original);
        info!(%dimensions, mode = %ctx.config.mode, "normalized input");

        let artifact = Artifact::new("Original", "original.png", dimensions.to_string());
        ctx.writer.persist_image(artifact, &original)?;
        Ok(Normalized {
            ctx,
            original,
            dimensions,
        })
    }
}

// ───────────────────────── Stage 1: Normalized ───────────────────────

/// The input as a flat RGB bitmap, written to disk.
#[must_use = "run stages are consumed by advancing — call .baseline() to continue"]
pub struct Normalized<'a> {
    ctx: Context<'a>,
    original: RgbImage,
    dimensions: Dimensions,
}

impl<'a> Normalized<'a> {
    /// The normalized input.
    #[must_use]
    pub const fn original(&self) -> &RgbImage {
        &self.original
    }

    /// Run the traditional upscale.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Artifact`] if the output cannot be written.
    pub fn baseline(self) -> Result<BaselineDone<'a>, RunError> {
        let Self {
            mut ctx,
            original,
            dimensions,
        } = self;
        if let Some(planned) = ctx.planned(StageName::Traditional) {
            let output = magnify_pipeline::traditional::upscale(&original, &ctx.config);
            let fallback = output.fallback_reason.map(|reason| {
                format!(
                    "{} backend unavailable ({reason}); used {}",
                    ctx.config.traditional_backend, output.backend
                )
            });
            if let Some(message) = &fallback {
                ctx.warn(message.clone());
            }
            let factor = ctx.config.traditional_factor;
            let artifact = Artifact::new(
                stage::traditional_label(factor),
                stage::traditional_file_name(factor),
                StageName::Traditional.note(),
            );
            ctx.record(planned, artifact, output.image, fallback)?;
        }
        Ok(BaselineDone {
            ctx,
            original,
            dimensions,
        })
    }
}

// ───────────────────────── Stage 2: BaselineDone ─────────────────────

/// The traditional baseline is written.
#[must_use = "run stages are consumed by advancing — call .learned() to continue"]
pub struct BaselineDone<'a> {
    ctx: Context<'a>,
    original: RgbImage,
    dimensions: Dimensions,
}

impl<'a> BaselineDone<'a> {
    /// Warnings recorded so far.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.ctx.warnings
    }

    /// Run the single-pass learned ×4 stages the mode plans.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::RequiredStage`] if a required learned pass
    /// fails, or [`RunError::Artifact`] if an output cannot be written.
    pub fn learned(self) -> Result<LearnedDone<'a>, RunError> {
        let Self {
            mut ctx,
            original,
            dimensions,
        } = self;
        let passes: Vec<PlannedStage> = ctx
            .config
            .mode
            .plan()
            .iter()
            .copied()
            .filter(|p| matches!(p.name, StageName::QualityX4 | StageName::FastX4))
            .collect();

        for planned in passes {
            let name = planned.name;
            let Some(kind) = name.model() else { continue };
            match ctx.learned(&original, kind) {
                Ok(image) => {
                    let artifact = Artifact::new(name.label(), name.file_name(), name.note());
                    ctx.record(planned, artifact, image, None)?;
                }
                Err(source) if planned.requirement == Requirement::Required => {
                    return Err(RunError::RequiredStage {
                        stage: name,
                        source,
                    });
                }
                Err(source) => ctx.skip(planned, source.to_string()),
            }
        }
        Ok(LearnedDone { ctx, dimensions })
    }
}

// ───────────────────────── Stage 3: LearnedDone ──────────────────────

/// Single-pass learned stages are done.
#[must_use = "run stages are consumed by advancing — call .chain() to continue"]
pub struct LearnedDone<'a> {
    ctx: Context<'a>,
    dimensions: Dimensions,
}

impl<'a> LearnedDone<'a> {
    /// Feed the quality ×4 output through a ×2 pass for an effective ×8.
    ///
    /// A missing small-scale model or runtime is replaced by a Lanczos ×2
    /// resample and recorded as a warning.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::RequiredStage`] if there is no ×4 output to
    /// chain from or the ×2 pass fails for another reason, or
    /// [`RunError::Artifact`] if the output cannot be written.
    pub fn chain(self) -> Result<ChainedDone<'a>, RunError> {
        let Self {
            mut ctx,
            dimensions,
        } = self;
        let name = StageName::ChainedX8;
        let Some(planned) = ctx.planned(name) else {
            return Ok(ChainedDone { ctx, dimensions });
        };
        let Some(input) = ctx.output(StageName::QualityX4).map(|p| &p.image) else {
            return Err(RunError::RequiredStage {
                stage: name,
                source: UpscaleError::Backend(format!(
                    "no {} output to chain from",
                    StageName::QualityX4
                )),
            });
        };

        let (image, note, fallback) = match ctx.learned(input, ModelKind::FsrcnnX2) {
            Ok(image) => (image, name.note(), None),
            Err(e @ (UpscaleError::ModelNotFound(_) | UpscaleError::BackendUnavailable(_))) => {
                let reason = format!(
                    "{} unavailable, resampled the last ×2 step instead: {e}",
                    ModelKind::FsrcnnX2
                );
                let image = magnify_pipeline::resample::lanczos_upscale(input, 2);
                (image, CHAINED_FALLBACK_NOTE, Some(reason))
            }
            Err(source) => {
                return Err(RunError::RequiredStage {
                    stage: name,
                    source,
                });
            }
        };
        if let Some(reason) = &fallback {
            ctx.warn(reason.clone());
        }
        let artifact = Artifact::new(name.label(), name.file_name(), note);
        ctx.record(planned, artifact, image, fallback)?;
        Ok(ChainedDone { ctx, dimensions })
    }
}

// ───────────────────────── Stage 4: ChainedDone ──────────────────────

/// Every upscale stage is done.
#[must_use = "run stages are consumed by advancing — call .overlay() to continue"]
pub struct ChainedDone<'a> {
    ctx: Context<'a>,
    dimensions: Dimensions,
}

impl<'a> ChainedDone<'a> {
    /// Recognize text on the best available output and render the
    /// overlay raster and its vector twin.
    ///
    /// Every way the overlay can fail to materialize is a warning.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Artifact`] if the overlay cannot be written.
    pub fn overlay(self) -> Result<OverlayDone<'a>, RunError> {
        let Self {
            mut ctx,
            dimensions,
        } = self;
        if let Some(planned) = ctx.planned(StageName::Overlay) {
            let rendered = recognize(&ctx).map(|(source, words)| {
                let typeface = ctx.collaborators.fonts.typeface();
                let (raster, svg) = magnify_export::render_overlay(
                    &source.image,
                    &words,
                    &typeface,
                    ctx.config.min_font_size,
                );
                info!(source = %source.stage, words = words.len(), "rendered overlay");
                let scale = source
                    .stage
                    .effective_scale(ctx.config.traditional_factor);
                (scale, raster, svg)
            });
            match rendered {
                Ok((scale, raster, svg)) => {
                    let (png_name, svg_name) = stage::overlay_file_names(scale);
                    let artifact = Artifact::new(
                        stage::overlay_label(scale),
                        png_name,
                        StageName::Overlay.note(),
                    );
                    let svg_path = ctx.writer.write_file(&svg_name, &svg)?;
                    ctx.overlay_svg = Some(svg_path);
                    ctx.record(planned, artifact, raster, None)?;
                }
                Err(reason) => ctx.skip(planned, reason),
            }
        }
        Ok(OverlayDone { ctx, dimensions })
    }
}

/// Pick the OCR source and run recognition on it.
fn recognize<'c>(
    ctx: &'c Context<'_>,
) -> Result<(&'c Produced, Vec<magnify_pipeline::OcrWord>), String> {
    let Some(source) = OCR_SOURCE_PREFERENCE
        .iter()
        .find_map(|name| ctx.output(*name))
    else {
        return Err("no source image produced".to_string());
    };
    let ocr = ctx.collaborators.ocr;
    if let Availability::Unavailable(reason) = ocr.probe() {
        return Err(reason);
    }

    let request = OcrRequest {
        image_path: &source.path,
        image: &source.image,
        language: &ctx.config.ocr_language,
        page_segmentation: ctx.config.ocr_page_segmentation,
    };
    let tsv = ocr.recognize(&request).map_err(|e| e.to_string())?;
    let words = magnify_pipeline::parse_tsv(&tsv, ctx.config.ocr_min_confidence);
    if words.is_empty() {
        return Err(format!(
            "no words at or above confidence {}",
            ctx.config.ocr_min_confidence
        ));
    }
    Ok((source, words))
}

// ───────────────────────── Stage 5: OverlayDone ──────────────────────

/// All stages are done; only the manifest documents remain.
#[must_use = "call .finalize() to write the manifest and get the RunReport"]
pub struct OverlayDone<'a> {
    ctx: Context<'a>,
    dimensions: Dimensions,
}

impl OverlayDone<'_> {
    /// Outcomes so far.
    #[must_use]
    pub fn stages(&self) -> &[StageOutcome] {
        &self.ctx.stages
    }

    /// Write `manifest.json` and `compare.html`.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Artifact`] if either cannot be written.
    pub fn finalize(self, generated_at: &str) -> Result<RunReport, RunError> {
        let Self { ctx, dimensions } = self;
        let output_dir = ctx.writer.dir().to_path_buf();
        let finished = ctx.writer.finish(generated_at)?;
        info!(
            artifacts = finished.manifest.items.len(),
            warnings = ctx.warnings.len(),
            dir = %output_dir.display(),
            "run finished"
        );
        Ok(RunReport {
            mode: ctx.config.mode,
            dimensions,
            manifest: finished.manifest,
            stages: ctx.stages,
            warnings: ctx.warnings,
            output_dir,
            manifest_path: finished.manifest_path,
            compare_path: finished.compare_path,
            overlay_svg: ctx.overlay_svg,
        })
    }
}

// ───────────────────────── Entry points ──────────────────────────────

/// Entry point for a staged run.
pub struct Run;

impl Run {
    /// Start a run over the encoded image `source`.
    ///
    /// Nothing is decoded or written until [`Pending::normalize`].
    #[allow(clippy::new_ret_no_self)]
    pub fn new(
        source: Vec<u8>,
        config: PipelineConfig,
        writer: ArtifactWriter,
        collaborators: Collaborators<'_>,
    ) -> Pending<'_> {
        Pending {
            source,
            ctx: Context {
                config,
                writer,
                collaborators,
                produced: Vec::new(),
                stages: Vec::new(),
                warnings: Vec::new(),
                overlay_svg: None,
            },
        }
    }
}

/// Run every stage in one call.
///
/// # Errors
///
/// Returns the first [`RunError`] any stage raises.
pub fn run(
    source: Vec<u8>,
    config: PipelineConfig,
    writer: ArtifactWriter,
    collaborators: Collaborators<'_>,
    generated_at: &str,
) -> Result<RunReport, RunError> {
    Run::new(source, config, writer, collaborators)
        .normalize()?
        .baseline()?
        .learned()?
        .chain()?
        .overlay()?
        .finalize(generated_at)
}
