//! Model download over HTTP.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use magnify_pipeline::ResolveError;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Something that can place the bytes behind `url` at `dest`.
///
/// Implementations must never leave a partial file at `dest`.
pub trait ModelFetcher {
    /// Download `url` to `dest`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Fetch`] or [`ResolveError::FetchTimeout`].
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ResolveError>;
}

/// Blocking HTTP downloader with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a downloader that gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Fetch`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("magnify/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ResolveError::Fetch {
                url: String::new(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }

    fn classify(&self, url: &str, err: &reqwest::Error) -> ResolveError {
        if err.is_timeout() {
            ResolveError::FetchTimeout {
                url: url.to_string(),
                seconds: self.timeout.as_secs(),
            }
        } else {
            ResolveError::Fetch {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

impl ModelFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), ResolveError> {
        info!(%url, dest = %dest.display(), "downloading model");
        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| self.classify(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Fetch {
                url: url.to_string(),
                reason: format!("server answered {status}"),
            });
        }
        debug!(size = ?response.content_length(), "download started");

        let mut temp = temp_beside(url, dest)?;
        response
            .copy_to(temp.as_file_mut())
            .map_err(|e| self.classify(url, &e))?;
        persist(url, temp, dest)?;

        info!(dest = %dest.display(), "model downloaded");
        Ok(())
    }
}

/// A temporary file in `dest`'s directory, so the final rename stays on
/// one filesystem.
pub(crate) fn temp_beside(url: &str, dest: &Path) -> Result<NamedTempFile, ResolveError> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    tempfile::Builder::new()
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| ResolveError::Fetch {
            url: url.to_string(),
            reason: format!("failed to create temporary file in {}: {e}", dir.display()),
        })
}

/// Flush `temp` and atomically move it to `dest`.
pub(crate) fn persist(url: &str, mut temp: NamedTempFile, dest: &Path) -> Result<(), ResolveError> {
    temp.flush().map_err(|e| ResolveError::Fetch {
        url: url.to_string(),
        reason: format!("failed to flush download: {e}"),
    })?;
    temp.persist(dest).map_err(|e| ResolveError::Fetch {
        url: url.to_string(),
        reason: format!("failed to move download to {}: {}", dest.display(), e.error),
    })?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn persist_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.pb");
        std::fs::write(&dest, b"stale").unwrap();

        let mut temp = temp_beside("u", &dest).unwrap();
        temp.write_all(b"fresh").unwrap();
        persist("u", temp, &dest).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"fresh");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == "part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn dropped_temp_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("model.pb");
        {
            let mut temp = temp_beside("u", &dest).unwrap();
            temp.write_all(b"partial").unwrap();
        }
        assert!(!dest.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
