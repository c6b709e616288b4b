//! The per-run output directory and the artifact manifest it accumulates.

use std::fmt::Display;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use magnify_export::{ExportError, LinkTarget};
use magnify_pipeline::{Artifact, Manifest, RgbImage};
use tracing::{debug, info};

/// Manifest file name.
pub const MANIFEST_FILE: &str = "manifest.json";
/// Local comparison page file name.
pub const COMPARE_FILE: &str = "compare.html";
/// Comparison page pointing at uploaded URLs.
pub const REMOTE_COMPARE_FILE: &str = "compare.r2.html";

/// Failure to persist an artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// A filesystem operation failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A bitmap could not be encoded.
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// Destination file.
        path: PathBuf,
        /// Underlying error.
        source: image::ImageError,
    },

    /// A document could not be serialized.
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// `YYYYMMDD-HHMMSS` for `at`.
#[must_use]
pub fn run_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%Y%m%d-%H%M%S").to_string()
}

/// Create a fresh directory `root/stamp`, appending `-2`, `-3`, … when
/// the name is taken.
///
/// # Errors
///
/// Returns [`ArtifactError::Io`] if the root cannot be created or a
/// directory cannot be made for a reason other than it existing.
pub fn create_run_dir(root: &Path, stamp: &str) -> Result<PathBuf, ArtifactError> {
    std::fs::create_dir_all(root).map_err(|source| ArtifactError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    let mut suffix = 1_u32;
    loop {
        let name = if suffix == 1 {
            stamp.to_string()
        } else {
            format!("{stamp}-{suffix}")
        };
        let dir = root.join(name);
        match std::fs::create_dir(&dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "created run directory");
                return Ok(dir);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
            Err(source) => return Err(ArtifactError::Io { path: dir, source }),
        }
    }
}

/// Paths of the documents written by [`ArtifactWriter::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// The manifest as recorded.
    pub manifest: Manifest,
    /// `manifest.json`.
    pub manifest_path: PathBuf,
    /// `compare.html`.
    pub compare_path: PathBuf,
}

/// Persists run outputs and records them, in completion order, in a
/// [`Manifest`].
#[derive(Debug)]
pub struct ArtifactWriter {
    dir: PathBuf,
    manifest: Manifest,
}

impl ArtifactWriter {
    /// Writer placing files in `dir`, which must already exist.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            manifest: Manifest::new(title),
        }
    }

    /// The output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The manifest recorded so far.
    #[must_use]
    pub const fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Encode `image` as PNG under `file` and record it.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Encode`] if the PNG cannot be written.
    pub fn persist_image(
        &mut self,
        artifact: Artifact,
        image: &RgbImage,
    ) -> Result<PathBuf, ArtifactError> {
        let path = self.dir.join(&artifact.file);
        image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|source| ArtifactError::Encode {
                path: path.clone(),
                source,
            })?;
        info!(file = %artifact.file, width = image.width(), height = image.height(), "wrote artifact");
        self.manifest.push(artifact);
        Ok(path)
    }

    /// Write a companion file that is not a manifest entry.
    ///
    /// # Errors
    ///
    /// Returns [`ArtifactError::Io`] on write failure.
    pub fn write_file(&self, file: &str, contents: &str) -> Result<PathBuf, ArtifactError> {
        let path = self.dir.join(file);
        std::fs::write(&path, contents).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(file, bytes = contents.len(), "wrote file");
        Ok(path)
    }

    /// Write `manifest.json` and the local `compare.html`.
    ///
    /// # Errors
    ///
    /// Returns an [`ArtifactError`] if either document cannot be written.
    pub fn finish(self, generated_at: &str) -> Result<Finished, ArtifactError> {
        let json = magnify_export::manifest_json(&self.manifest)?;
        let manifest_path = self.write_file(MANIFEST_FILE, &json)?;
        let page = magnify_export::compare_html(&self.manifest, LinkTarget::Local, generated_at);
        let compare_path = self.write_file(COMPARE_FILE, &page)?;
        Ok(Finished {
            manifest: self.manifest,
            manifest_path,
            compare_path,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;

    #[test]
    fn stamp_is_compact_local_time() {
        let at = NaiveDate::from_ymd_opt(2026, 1, 23)
            .unwrap()
            .and_hms_opt(4, 5, 6)
            .unwrap()
            .and_utc();
        assert_eq!(run_stamp(&at), "20260123-040506");
        let _ = run_stamp(&Utc::now());
    }

    #[test]
    fn taken_stamp_gets_suffix() {
        let root = tempfile::tempdir().unwrap();
        let a = create_run_dir(root.path(), "20260101-000000").unwrap();
        let b = create_run_dir(root.path(), "20260101-000000").unwrap();
        let c = create_run_dir(root.path(), "20260101-000000").unwrap();
        assert_eq!(a.file_name().unwrap(), "20260101-000000");
        assert_eq!(b.file_name().unwrap(), "20260101-000000-2");
        assert_eq!(c.file_name().unwrap(), "20260101-000000-3");
    }

    #[test]
    fn entries_keep_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::new(dir.path(), "t");
        let img = RgbImage::new(2, 2);
        writer.persist_image(Artifact::new("B", "b.png", ""), &img).unwrap();
        writer.persist_image(Artifact::new("A", "a.png", ""), &img).unwrap();
        writer.persist_image(Artifact::new("B again", "b.png", ""), &img).unwrap();
        assert_eq!(writer.manifest().files(), vec!["b.png", "a.png", "b.png"]);

        let done = writer.finish("now").unwrap();
        assert!(done.manifest_path.is_file());
        let page = std::fs::read_to_string(&done.compare_path).unwrap();
        assert_eq!(page.matches(r#"<figure class="card">"#).count(), 3);
    }

    #[test]
    fn companion_files_are_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path(), "t");
        writer.write_file("layer.svg", "<svg/>").unwrap();
        assert!(writer.manifest().items.is_empty());
        assert!(dir.path().join("layer.svg").is_file());
    }
}
