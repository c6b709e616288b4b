//! magnify: enlarge a small image several ways and overlay its text.
//!
//! Writes one timestamped directory per invocation containing the
//! normalized input, a traditional ×8 baseline, learned ×4 and chained ×8
//! variants (depending on `--mode`), an OCR text overlay, `manifest.json`
//! and a `compare.html` page. Diagnostics go to stderr; stdout carries
//! only `KEY=value` lines for automation.
//!
//! # Usage
//!
//! ```text
//! magnify --in screenshot.png [--mode best-text] [--out-dir tmp/magnify]
//! ```
//!
//! # Exit status
//!
//! 0 on success, 2 when the input does not exist, 1 on any other failure.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use magnify_export::LinkTarget;
use magnify_io::fonts::platform_candidates;
use magnify_io::upload::{self, R2Config, R2Uploader};
use magnify_io::writer::{self, REMOTE_COMPARE_FILE};
use magnify_io::{
    ArtifactWriter, Collaborators, CommandSuperResolver, FontLocator, FontSearch, ModelResolver,
    ModelSearch, RunReport, RunSettings, TesseractOcr, UnavailableSuperResolver,
};
use magnify_pipeline::{Mode, PipelineConfig, SuperResolver, TraditionalBackend};
use tracing::{error, info, warn};

/// Enlarge an image and overlay recognized text for legibility.
///
/// Produces a traditional ×8 baseline, learned super-resolution variants
/// and an OCR text overlay, plus a side-by-side comparison page.
#[derive(Parser)]
#[command(name = "magnify", version)]
struct Cli {
    /// Input image (PNG, JPEG, BMP, WebP, GIF, TIFF).
    #[arg(long = "in", value_name = "PATH")]
    input: PathBuf,

    /// Which stages to run.
    #[arg(long, value_enum, default_value_t = ModeArg::BestText)]
    mode: ModeArg,

    /// Output root; each run gets a timestamped subdirectory.
    #[arg(long, default_value = "tmp/magnify")]
    out_dir: PathBuf,

    /// Directory searched first for learned model files.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Download missing models into tmp/opencv_sr_models.
    #[arg(long)]
    download_models: bool,

    /// Seconds allowed per model download.
    #[arg(long, default_value_t = ModelSearch::DEFAULT_FETCH_TIMEOUT.as_secs())]
    download_timeout: u64,

    /// Learned inference command (default: $MAGNIFY_SR_COMMAND).
    #[arg(long)]
    sr_command: Option<PathBuf>,

    /// Seconds allowed per learned inference pass.
    #[arg(long, default_value_t = RunSettings::DEFAULT_SR_TIMEOUT.as_secs())]
    sr_timeout: u64,

    /// Traditional enhancement backend.
    #[arg(long, value_enum, default_value_t = Backend::Clahe)]
    traditional_backend: Backend,

    /// Font for the overlay (TTF/OTF/TTC); default: $MAGNIFY_FONT, then
    /// common system fonts, then a built-in face.
    #[arg(long)]
    font: Option<PathBuf>,

    /// OCR language.
    #[arg(long, default_value = PipelineConfig::DEFAULT_OCR_LANGUAGE)]
    ocr_lang: String,

    /// OCR page-segmentation mode.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OCR_PAGE_SEGMENTATION)]
    ocr_psm: u32,

    /// Minimum OCR confidence (0-100) for a word to be drawn.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_OCR_MIN_CONFIDENCE)]
    ocr_min_conf: f64,

    /// OCR program.
    #[arg(long, default_value = RunSettings::DEFAULT_OCR_PROGRAM)]
    ocr_program: String,

    /// Seconds allowed per OCR call.
    #[arg(long, default_value_t = RunSettings::DEFAULT_OCR_TIMEOUT.as_secs())]
    ocr_timeout: u64,

    /// Upload the outputs to Cloudflare R2.
    #[arg(long)]
    upload: bool,

    /// Object key prefix for uploads, e.g. `upscale/case/20260123`.
    #[arg(long, default_value = "")]
    upload_prefix: String,

    /// Seconds allowed per upload request.
    #[arg(long, default_value_t = 120)]
    upload_timeout: u64,

    /// Env file holding upload credentials (default: $R2_ENV_FILE, then ./.env).
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, the pipeline flags (mode, backend, OCR tuning) are
    /// ignored. The JSON must be a valid `PipelineConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long)]
    verbose: bool,
}

/// Stage plan selection.
#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// EDSR ×4 → ×2 plus OCR overlay.
    BestText,
    /// EDSR ×4.
    Quality,
    /// FSRCNN ×4.
    Fast,
    /// CLAHE + unsharp ×8 only.
    Traditional,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::BestText => Self::BestText,
            ModeArg::Quality => Self::Quality,
            ModeArg::Fast => Self::Fast,
            ModeArg::Traditional => Self::Traditional,
        }
    }
}

/// Traditional backend selection.
#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// Luminance CLAHE followed by a Gaussian unsharp blend.
    Clahe,
    /// Unsharp mask, autocontrast, contrast and sharpness boosts.
    Basic,
}

impl From<Backend> for TraditionalBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Clahe => Self::Clahe,
            Backend::Basic => Self::Basic,
        }
    }
}

/// Build the pipeline configuration from `--config-json` or the
/// individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    Ok(PipelineConfig {
        mode: cli.mode.into(),
        traditional_backend: cli.traditional_backend.into(),
        ocr_language: cli.ocr_lang.clone(),
        ocr_page_segmentation: cli.ocr_psm,
        ocr_min_confidence: cli.ocr_min_conf,
        ..PipelineConfig::default()
    })
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Gather every IO setting; the only place the environment is read for
/// the run itself.
fn settings_from_cli(cli: &Cli) -> RunSettings {
    let start_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let home_dir = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    let search_path = std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default();

    let mut settings = RunSettings::new(&cli.out_dir, start_dir);
    settings.models.explicit_dir.clone_from(&cli.model_dir);
    settings.models.env_dir = env_path("OPENCV_SR_MODEL_DIR");
    settings.models.home_dir = home_dir;
    settings.models.allow_fetch = cli.download_models;
    settings.models.fetch_timeout = Duration::from_secs(cli.download_timeout);
    settings.sr_command = cli
        .sr_command
        .clone()
        .or_else(|| env_path("MAGNIFY_SR_COMMAND"));
    settings.sr_timeout = Duration::from_secs(cli.sr_timeout);
    settings.ocr_program.clone_from(&cli.ocr_program);
    settings.ocr_timeout = Duration::from_secs(cli.ocr_timeout);
    settings.search_path = search_path;
    settings.fonts = FontSearch {
        explicit: cli.font.clone(),
        env_override: env_path("MAGNIFY_FONT"),
        candidates: platform_candidates(),
    };
    settings
}

/// Variables from the credentials env file, if one can be found.
fn env_file_vars(explicit: Option<&Path>) -> BTreeMap<String, String> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_path("R2_ENV_FILE"))
        .or_else(|| env_path("CLOUDFLARE_ENV_FILE"))
        .or_else(|| Some(PathBuf::from(".env")).filter(|p| p.is_file()));
    let Some(path) = path else {
        return BTreeMap::new();
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => upload::parse_env_file(&text),
        Err(e) => {
            warn!(path = %path.display(), "cannot read env file: {e}");
            BTreeMap::new()
        }
    }
}

/// Resolve upload credentials: process environment first, then the env
/// file.
fn upload_config(cli: &Cli) -> Result<R2Config, upload::UploadError> {
    let file_vars = env_file_vars(cli.env_file.as_deref());
    R2Config::from_lookup(|name| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| file_vars.get(name).cloned())
    })
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !cli.input.exists() {
        error!(input = %cli.input.display(), "input not found");
        return ExitCode::from(2);
    }

    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = config_from_cli(cli)?;
    let prefix = cli.upload_prefix.trim().to_string();
    let uploader = if cli.upload {
        if prefix.is_empty() {
            return Err("--upload requires --upload-prefix".into());
        }
        let timeout = Duration::from_secs(cli.upload_timeout);
        Some(R2Uploader::new(upload_config(cli)?, timeout)?)
    } else {
        None
    };

    let settings = settings_from_cli(cli);
    let started = chrono::Local::now();
    let stamp = writer::run_stamp(&started);
    let out_dir = writer::create_run_dir(&settings.output_root, &stamp)?;

    let models = ModelResolver::from_search(&settings.models)?;
    let super_resolver: Box<dyn SuperResolver> = match &settings.sr_command {
        Some(command) => Box::new(CommandSuperResolver::new(
            command,
            settings.search_path.clone(),
            settings.sr_timeout,
        )),
        None => Box::new(UnavailableSuperResolver::new(
            "no inference command configured (use --sr-command or MAGNIFY_SR_COMMAND)",
        )),
    };
    let ocr = TesseractOcr::new(
        settings.ocr_program.clone(),
        settings.search_path.clone(),
        settings.ocr_timeout,
    );
    let fonts = FontLocator::new(settings.fonts.clone());
    let collaborators = Collaborators {
        models: &models,
        super_resolver: super_resolver.as_ref(),
        ocr: &ocr,
        fonts: &fonts,
    };

    info!(input = %cli.input.display(), mode = %config.mode, dir = %out_dir.display(), "starting run");
    let source = std::fs::read(&cli.input)?;
    let writer = ArtifactWriter::new(&out_dir, format!("Magnify · {stamp}"));
    let generated_at = started.format("%Y-%m-%d %H:%M:%S").to_string();
    let report = magnify_io::run(source, config, writer, collaborators, &generated_at)?;

    println!("OUT_DIR={}", out_dir.display());
    println!("MANIFEST={}", report.manifest_path.display());
    println!("COMPARE_HTML={}", report.compare_path.display());

    if let Some(uploader) = uploader {
        publish(&uploader, &report, &prefix, &stamp, &generated_at)?;
    }
    Ok(())
}

/// Upload every artifact, refresh sidecars and write the remote page.
fn publish(
    uploader: &R2Uploader,
    report: &RunReport,
    prefix: &str,
    stamp: &str,
    generated_at: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut files: Vec<PathBuf> = Vec::new();
    for name in report.manifest.files() {
        let path = report.output_dir.join(name);
        if path.is_file() && !files.contains(&path) {
            files.push(path);
        }
    }
    if let Some(svg) = &report.overlay_svg {
        files.push(svg.clone());
    }
    files.push(report.compare_path.clone());

    let uploaded = upload::publish(uploader, &files, prefix)?;

    let mut manifest = report.manifest.clone();
    manifest.title = format!("Magnify (R2) · {stamp}");
    upload::attach_urls(&mut manifest, &uploaded);
    let page = magnify_export::compare_html(&manifest, LinkTarget::Remote, generated_at);
    let remote_page = report.output_dir.join(REMOTE_COMPARE_FILE);
    std::fs::write(&remote_page, page)?;

    println!("R2_PREFIX={prefix}");
    if let Some(url) = uploaded
        .iter()
        .find(|u| u.file_name == writer::COMPARE_FILE)
        .and_then(|u| u.url.as_deref())
    {
        println!("COMPARE_R2_URL={url}");
    }
    println!("COMPARE_R2_HTML={}", remote_page.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("magnify").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_pipeline_defaults() {
        let cli = parse(&["--in", "a.png"]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(cli.out_dir, PathBuf::from("tmp/magnify"));
        assert!(!cli.upload);
    }

    #[test]
    fn flags_flow_into_config() {
        let cli = parse(&[
            "--in",
            "a.png",
            "--mode",
            "traditional",
            "--traditional-backend",
            "basic",
            "--ocr-lang",
            "deu",
            "--ocr-min-conf",
            "55",
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.mode, Mode::Traditional);
        assert_eq!(config.traditional_backend, TraditionalBackend::Basic);
        assert_eq!(config.ocr_language, "deu");
        assert!((config.ocr_min_confidence - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = parse(&[
            "--in",
            "a.png",
            "--mode",
            "fast",
            "--config-json",
            r#"{"mode":"quality","traditional_factor":4}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.mode, Mode::Quality);
        assert_eq!(config.traditional_factor, 4);
    }

    #[test]
    fn bad_config_json_is_reported() {
        let cli = parse(&["--in", "a.png", "--config-json", "{"]);
        assert!(config_from_cli(&cli).unwrap_err().contains("--config-json"));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Cli::try_parse_from(["magnify", "--in", "a.png", "--mode", "ultra"]).is_err());
    }

    #[test]
    fn explicit_env_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.env");
        std::fs::write(&path, "R2_BUCKET=shots\n").unwrap();
        let vars = env_file_vars(Some(&path));
        assert_eq!(vars.get("R2_BUCKET").map(String::as_str), Some("shots"));
    }
}
