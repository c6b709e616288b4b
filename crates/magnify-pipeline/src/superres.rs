//! Learned super-resolution contract.
//!
//! Inference itself is an opaque collaborator behind [`SuperResolver`];
//! locating the model artifact is a separate collaborator behind
//! [`ModelLocator`]. This module owns only the model table, the error
//! taxonomy, and [`run_learned`], which composes the two and enforces
//! the output-size contract.

use std::fmt;
use std::path::PathBuf;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::types::{Availability, Dimensions};

/// The learned models the pipeline knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// EDSR ×4: best quality, heavy on memory.
    EdsrX4,
    /// FSRCNN ×4: fast, low memory.
    FsrcnnX4,
    /// FSRCNN ×2: small-factor pass used to chain ×4 to ×8.
    FsrcnnX2,
}

impl ModelKind {
    /// Every known model.
    pub const ALL: [Self; 3] = [Self::EdsrX4, Self::FsrcnnX4, Self::FsrcnnX2];

    /// File name of the model artifact.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::EdsrX4 => "EDSR_x4.pb",
            Self::FsrcnnX4 => "FSRCNN_x4.pb",
            Self::FsrcnnX2 => "FSRCNN_x2.pb",
        }
    }

    /// Lower-case algorithm name understood by inference backends.
    #[must_use]
    pub const fn algorithm(self) -> &'static str {
        match self {
            Self::EdsrX4 => "edsr",
            Self::FsrcnnX4 | Self::FsrcnnX2 => "fsrcnn",
        }
    }

    /// Integer scale factor the model produces.
    #[must_use]
    pub const fn scale(self) -> u32 {
        match self {
            Self::EdsrX4 | Self::FsrcnnX4 => 4,
            Self::FsrcnnX2 => 2,
        }
    }

    /// Fixed remote location the artifact can be fetched from.
    #[must_use]
    pub const fn url(self) -> &'static str {
        match self {
            Self::EdsrX4 => {
                "https://raw.githubusercontent.com/Saafke/EDSR_Tensorflow/master/models/EDSR_x4.pb"
            }
            Self::FsrcnnX4 => {
                "https://raw.githubusercontent.com/Saafke/FSRCNN_Tensorflow/master/models/FSRCNN_x4.pb"
            }
            Self::FsrcnnX2 => {
                "https://raw.githubusercontent.com/Saafke/FSRCNN_Tensorflow/master/models/FSRCNN_x2.pb"
            }
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdsrX4 => f.write_str("EDSR ×4"),
            Self::FsrcnnX4 => f.write_str("FSRCNN ×4"),
            Self::FsrcnnX2 => f.write_str("FSRCNN ×2"),
        }
    }
}

/// A model resolved to a concrete artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Which model this is.
    pub kind: ModelKind,
    /// Location of the artifact.
    pub path: PathBuf,
}

impl ModelSpec {
    /// Scale factor of the underlying model.
    #[must_use]
    pub const fn scale(&self) -> u32 {
        self.kind.scale()
    }
}

/// Failure to locate or fetch a model artifact.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// No candidate directory held the artifact and fetching was not
    /// permitted.
    #[error(
        "model {file} not found (searched: {searched}); download it from {url} or allow fetching",
        file = .kind.file_name(),
        searched = display_paths(.searched),
        url = .kind.url(),
    )]
    NotFound {
        /// The model that was looked for.
        kind: ModelKind,
        /// Every path checked, in search order.
        searched: Vec<PathBuf>,
    },

    /// The download itself failed.
    #[error("failed to fetch {url}: {reason}")]
    Fetch {
        /// Source URL.
        url: String,
        /// Human-readable cause.
        reason: String,
    },

    /// The download did not complete in time.
    #[error("timed out fetching {url} after {seconds}s")]
    FetchTimeout {
        /// Source URL.
        url: String,
        /// Configured limit.
        seconds: u64,
    },
}

/// Failure of a learned upscale pass.
#[derive(Debug, thiserror::Error)]
pub enum UpscaleError {
    /// The model artifact could not be located.
    #[error(transparent)]
    ModelNotFound(#[from] ResolveError),

    /// The inference runtime itself is missing.
    #[error("super-resolution backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The runtime is present but the pass failed.
    #[error("super-resolution failed: {0}")]
    Backend(String),

    /// The runtime returned a bitmap of the wrong size.
    #[error("super-resolution returned {actual}, expected {expected}")]
    OutputSize {
        /// `scale × input`.
        expected: Dimensions,
        /// What came back.
        actual: Dimensions,
    },
}

/// Finds model artifacts on behalf of the learned stages.
pub trait ModelLocator {
    /// Locate (and, if permitted, fetch) the artifact for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotFound`] with the searched paths when
    /// nothing was found and fetching was not permitted, or a fetch
    /// error when the download failed.
    fn locate(&self, kind: ModelKind) -> Result<ModelSpec, ResolveError>;
}

/// An inference backend mapping `H×W` to `(H·s)×(W·s)`.
pub trait SuperResolver {
    /// Whether the runtime is usable at all.
    fn probe(&self) -> Availability;

    /// Run one forward pass with `model`.
    ///
    /// # Errors
    ///
    /// Returns [`UpscaleError::Backend`] (or
    /// [`UpscaleError::BackendUnavailable`]) when inference fails.
    fn upscale(&self, image: &RgbImage, model: &ModelSpec) -> Result<RgbImage, UpscaleError>;
}

/// Probe the backend, locate the model, upscale, and verify the size.
///
/// The probe runs first so a missing runtime is reported as
/// [`UpscaleError::BackendUnavailable`] without touching the model
/// search or the network.
///
/// # Errors
///
/// Any [`UpscaleError`]; see the variants.
pub fn run_learned(
    image: &RgbImage,
    kind: ModelKind,
    locator: &dyn ModelLocator,
    resolver: &dyn SuperResolver,
) -> Result<RgbImage, UpscaleError> {
    if let Availability::Unavailable(reason) = resolver.probe() {
        return Err(UpscaleError::BackendUnavailable(reason));
    }
    let model = locator.locate(kind)?;
    let output = resolver.upscale(image, &model)?;

    let expected = Dimensions::of(image).scaled(kind.scale());
    let actual = Dimensions::of(&output);
    if actual != expected {
        return Err(UpscaleError::OutputSize { expected, actual });
    }
    Ok(output)
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nowhere".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
