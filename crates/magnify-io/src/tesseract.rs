//! The Tesseract OCR collaborator.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use magnify_pipeline::{Availability, OcrEngine, OcrError, OcrRequest};
use tracing::debug;

use crate::process::{self, ProcessError};

/// Runs `tesseract <image> stdout --psm <psm> -l <lang> tsv`.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    program: String,
    search_path: Vec<PathBuf>,
    timeout: Duration,
}

impl TesseractOcr {
    /// Engine invoking `program`, looked up on `search_path` when bare.
    #[must_use]
    pub fn new(program: impl Into<String>, search_path: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            search_path,
            timeout,
        }
    }

    fn executable(&self) -> Result<PathBuf, OcrError> {
        process::find_program(&self.program, &self.search_path)
            .ok_or_else(|| OcrError::Unavailable(format!("{} not found on PATH", self.program)))
    }
}

impl OcrEngine for TesseractOcr {
    fn probe(&self) -> Availability {
        match self.executable() {
            Ok(_) => Availability::Available,
            Err(e) => Availability::Unavailable(e.to_string()),
        }
    }

    fn recognize(&self, request: &OcrRequest<'_>) -> Result<String, OcrError> {
        let exe = self.executable()?;
        let mut command = Command::new(&exe);
        command
            .arg(request.image_path)
            .arg("stdout")
            .arg("--psm")
            .arg(request.page_segmentation.to_string())
            .arg("-l")
            .arg(request.language)
            .arg("tsv");

        debug!(image = %request.image_path.display(), lang = request.language, "running OCR");
        let output = process::run_with_timeout(command, self.timeout).map_err(|e| match e {
            ProcessError::Spawn { .. } => OcrError::Unavailable(e.to_string()),
            ProcessError::Timeout { seconds, .. } => OcrError::Timeout {
                path: request.image_path.to_path_buf(),
                seconds,
            },
            ProcessError::Wait { .. } => OcrError::Failed(e.to_string()),
        })?;

        if !output.status.success() {
            let stderr = output.stderr_text();
            let reason = if stderr.is_empty() {
                format!("{} exited with {}", exe.display(), output.status)
            } else {
                stderr
            };
            return Err(OcrError::Failed(reason));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
