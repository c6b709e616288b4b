//! IO-facing settings, assembled once at process start.
//!
//! Nothing in this crate reads the process environment. The binary
//! collects flags, environment variables and home-directory lookups into
//! a [`RunSettings`] and passes it down.

use std::path::PathBuf;
use std::time::Duration;

/// Where to look for learned model artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSearch {
    /// Directory given explicitly on the command line.
    pub explicit_dir: Option<PathBuf>,
    /// Directory named by the model-directory environment variable.
    pub env_dir: Option<PathBuf>,
    /// Where the upward search for the relative cache directory starts.
    pub start_dir: PathBuf,
    /// The user's home directory, if known.
    pub home_dir: Option<PathBuf>,
    /// Whether missing models may be downloaded.
    pub allow_fetch: bool,
    /// Limit on a single download.
    pub fetch_timeout: Duration,
}

impl ModelSearch {
    /// Cache directory searched in the start directory and each ancestor.
    pub const RELATIVE_CACHE: &str = "tmp/opencv_sr_models";

    /// Cache directories under the home directory, in search order.
    pub const HOME_CACHES: [&str; 2] = [".codex/cache/opencv_sr_models", ".cache/opencv_sr_models"];

    /// Default download limit.
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

    /// Search rooted at `start_dir` with no overrides and no fetching.
    #[must_use]
    pub fn new(start_dir: impl Into<PathBuf>) -> Self {
        Self {
            explicit_dir: None,
            env_dir: None,
            start_dir: start_dir.into(),
            home_dir: None,
            allow_fetch: false,
            fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Where downloads land.
    #[must_use]
    pub fn fetch_dir(&self) -> PathBuf {
        self.start_dir.join(Self::RELATIVE_CACHE)
    }
}

/// Where to look for the overlay font.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FontSearch {
    /// Font given explicitly on the command line.
    pub explicit: Option<PathBuf>,
    /// Font named by the font environment variable.
    pub env_override: Option<PathBuf>,
    /// Platform candidates, in preference order.
    pub candidates: Vec<PathBuf>,
}

/// Everything the IO collaborators need for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Parent of the per-run timestamped output directory.
    pub output_root: PathBuf,
    /// Model discovery.
    pub models: ModelSearch,
    /// Learned-inference command; `None` means no learned backend.
    pub sr_command: Option<PathBuf>,
    /// Limit on a single inference pass.
    pub sr_timeout: Duration,
    /// OCR program name or path.
    pub ocr_program: String,
    /// Limit on a single OCR call.
    pub ocr_timeout: Duration,
    /// Directories searched for bare program names.
    pub search_path: Vec<PathBuf>,
    /// Font discovery.
    pub fonts: FontSearch,
}

impl RunSettings {
    /// Default OCR program.
    pub const DEFAULT_OCR_PROGRAM: &str = "tesseract";
    /// Default inference limit.
    pub const DEFAULT_SR_TIMEOUT: Duration = Duration::from_secs(600);
    /// Default OCR limit.
    pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(120);

    /// Settings writing under `output_root` and searching for models
    /// from `start_dir`, with every optional collaborator unset.
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>, start_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            models: ModelSearch::new(start_dir),
            sr_command: None,
            sr_timeout: Self::DEFAULT_SR_TIMEOUT,
            ocr_program: Self::DEFAULT_OCR_PROGRAM.to_string(),
            ocr_timeout: Self::DEFAULT_OCR_TIMEOUT,
            search_path: Vec::new(),
            fonts: FontSearch::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_dir_is_relative_cache_under_start() {
        let search = ModelSearch::new("/work/project");
        assert_eq!(
            search.fetch_dir(),
            PathBuf::from("/work/project/tmp/opencv_sr_models")
        );
    }

    #[test]
    fn new_settings_disable_optional_collaborators() {
        let settings = RunSettings::new("out", ".");
        assert!(settings.sr_command.is_none());
        assert!(!settings.models.allow_fetch);
        assert_eq!(settings.ocr_program, "tesseract");
    }
}
