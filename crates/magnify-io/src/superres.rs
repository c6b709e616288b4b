//! Learned super-resolution backends.
//!
//! Inference runs out of process: [`CommandSuperResolver`] hands a PNG to
//! an external command and reads the enlarged PNG back.
//! [`UnavailableSuperResolver`] stands in when no command is configured so
//! every learned stage sees an explicit "unavailable" probe.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use magnify_pipeline::{Availability, ModelSpec, RgbImage, SuperResolver, UpscaleError};
use tracing::{debug, info};

use crate::process::{self, ProcessError};

/// Runs `<program> --model <path> --algorithm <name> --scale <s> <in> <out>`.
#[derive(Debug, Clone)]
pub struct CommandSuperResolver {
    program: PathBuf,
    search_path: Vec<PathBuf>,
    timeout: Duration,
}

impl CommandSuperResolver {
    /// Backend invoking `program`, looked up on `search_path` when bare.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, search_path: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            search_path,
            timeout,
        }
    }

    fn resolved_program(&self) -> Option<PathBuf> {
        process::find_program(&self.program.to_string_lossy(), &self.search_path)
    }
}

impl SuperResolver for CommandSuperResolver {
    fn probe(&self) -> Availability {
        match self.resolved_program() {
            Some(_) => Availability::Available,
            None => Availability::Unavailable(format!(
                "inference command {} not found",
                self.program.display()
            )),
        }
    }

    fn upscale(&self, image: &RgbImage, model: &ModelSpec) -> Result<RgbImage, UpscaleError> {
        let Some(program) = self.resolved_program() else {
            return Err(UpscaleError::BackendUnavailable(format!(
                "inference command {} not found",
                self.program.display()
            )));
        };

        let scratch = tempfile::tempdir()
            .map_err(|e| UpscaleError::Backend(format!("failed to create scratch dir: {e}")))?;
        let input = scratch.path().join("input.png");
        let output = scratch.path().join("output.png");
        image
            .save(&input)
            .map_err(|e| UpscaleError::Backend(format!("failed to write input: {e}")))?;

        let mut command = Command::new(&program);
        command
            .arg("--model")
            .arg(&model.path)
            .arg("--algorithm")
            .arg(model.kind.algorithm())
            .arg("--scale")
            .arg(model.scale().to_string())
            .arg(&input)
            .arg(&output);

        info!(model = %model.kind, "running learned upscale");
        let result = process::run_with_timeout(command, self.timeout).map_err(|e| match e {
            ProcessError::Spawn { .. } => UpscaleError::BackendUnavailable(e.to_string()),
            ProcessError::Timeout { .. } | ProcessError::Wait { .. } => {
                UpscaleError::Backend(e.to_string())
            }
        })?;
        if !result.status.success() {
            return Err(UpscaleError::Backend(format!(
                "{} exited with {}: {}",
                program.display(),
                result.status,
                result.stderr_text()
            )));
        }

        let enlarged = image::open(&output)
            .map_err(|e| UpscaleError::Backend(format!("unreadable backend output: {e}")))?
            .to_rgb8();
        debug!(width = enlarged.width(), height = enlarged.height(), "learned output read");
        Ok(enlarged)
    }
}

/// Backend used when no inference runtime is configured.
#[derive(Debug, Clone, Default)]
pub struct UnavailableSuperResolver {
    reason: String,
}

impl UnavailableSuperResolver {
    /// Report `reason` from every probe.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl SuperResolver for UnavailableSuperResolver {
    fn probe(&self) -> Availability {
        Availability::Unavailable(self.reason.clone())
    }

    fn upscale(&self, _image: &RgbImage, _model: &ModelSpec) -> Result<RgbImage, UpscaleError> {
        Err(UpscaleError::BackendUnavailable(self.reason.clone()))
    }
}
