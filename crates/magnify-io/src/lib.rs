//! magnify-io: Filesystem, subprocess and network collaborators.
//!
//! Implements the traits `magnify-pipeline` defines against the real
//! world (model files on disk and over HTTP, an external inference
//! command, the Tesseract binary, system fonts) and drives a complete run
//! through [`run::Run`], writing every artifact into one timestamped
//! output directory.

pub mod fetch;
pub mod fonts;
pub mod process;
pub mod resolver;
pub mod run;
pub mod settings;
pub mod superres;
pub mod tesseract;
pub mod upload;
pub mod writer;

pub use fetch::{HttpFetcher, ModelFetcher};
pub use fonts::FontLocator;
pub use resolver::{ModelResolver, SearchStrategy};
pub use run::{Collaborators, Run, RunError, RunReport, StageOutcome, StageStatus, run};
pub use settings::{FontSearch, ModelSearch, RunSettings};
pub use superres::{CommandSuperResolver, UnavailableSuperResolver};
pub use tesseract::TesseractOcr;
pub use upload::{ObjectStore, R2Config, R2Uploader, UploadError, Uploaded};
pub use writer::{ArtifactError, ArtifactWriter};
