//! Optional upload of run artifacts to Cloudflare R2.
//!
//! Each uploaded file gets a sidecar `<stem>.json` next to it. Fields
//! already present in the sidecar are preserved; only the upload fields
//! are set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use magnify_pipeline::Manifest;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Cloudflare API root.
const API_ROOT: &str = "https://api.cloudflare.com/client/v4/accounts";

/// Value of the `source` sidecar field when none was recorded before.
pub const DEFAULT_SOURCE: &str = "r2-upload";

/// Upload failure.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Required credentials are absent.
    #[error(
        "missing upload credentials: {0}; need CLOUDFLARE_ACCOUNT_ID, CLOUDFLARE_API_TOKEN and R2_BUCKET (optional R2_PUBLIC_BASE_URL), set them or point R2_ENV_FILE at an env file"
    )]
    MissingCredentials(String),

    /// A local file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being uploaded.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The request could not be sent.
    #[error("upload of {key} failed: {reason}")]
    Request {
        /// Object key.
        key: String,
        /// What went wrong.
        reason: String,
    },

    /// The store rejected the object.
    #[error("upload of {key} rejected with status {status}: {body}")]
    Status {
        /// Object key.
        key: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The store did not answer in time.
    #[error("upload of {key} timed out after {seconds}s")]
    Timeout {
        /// Object key.
        key: String,
        /// Configured limit.
        seconds: u64,
    },

    /// A sidecar could not be written.
    #[error("failed to write metadata {path}: {reason}")]
    Metadata {
        /// Sidecar path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },
}

/// Credentials and destination for R2.
#[derive(Clone, PartialEq, Eq)]
pub struct R2Config {
    /// Cloudflare account.
    pub account_id: String,
    /// Bearer token.
    pub api_token: String,
    /// Destination bucket.
    pub bucket: String,
    /// Public URL root for uploaded objects, if the bucket is exposed.
    pub public_base: Option<String>,
}

impl std::fmt::Debug for R2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("R2Config")
            .field("account_id", &self.account_id)
            .field("api_token", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("public_base", &self.public_base)
            .finish()
    }
}

impl R2Config {
    /// Assemble credentials from `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::MissingCredentials`] naming what is absent.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, UploadError> {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };
        let account_id = first(&["CLOUDFLARE_ACCOUNT_ID"]);
        let api_token = first(&["CLOUDFLARE_API_TOKEN"]);
        let bucket = first(&["R2_BUCKET", "R2_BUCKET_NAME", "BUCKET"]);
        let public_base = first(&["R2_PUBLIC_BASE_URL", "PUBLIC_URL"]);

        match (account_id, api_token, bucket) {
            (Some(account_id), Some(api_token), Some(bucket)) => Ok(Self {
                account_id,
                api_token,
                bucket,
                public_base,
            }),
            (account, token, bucket) => {
                let missing: Vec<&str> = [
                    (account.is_none(), "account id"),
                    (token.is_none(), "API token"),
                    (bucket.is_none(), "bucket"),
                ]
                .into_iter()
                .filter_map(|(absent, what)| absent.then_some(what))
                .collect();
                Err(UploadError::MissingCredentials(missing.join(", ")))
            }
        }
    }
}

/// Parse `KEY=value` lines. Blank lines and `#` comments are ignored;
/// values lose surrounding whitespace and quotes. Earlier keys win.
#[must_use]
pub fn parse_env_file(text: &str) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches(|c| c == '\'' || c == '"');
        vars.entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
    vars
}

/// `<prefix>/<file>`, with slashes around the prefix normalized.
#[must_use]
pub fn object_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.trim().trim_matches('/');
    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{prefix}/{file_name}")
    }
}

/// Public URL of `key` under `base`.
#[must_use]
pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/{key}", base.trim_end_matches('/'))
}

/// Content type by extension.
#[must_use]
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Sidecar path for `file`: same stem, `.json` extension.
#[must_use]
pub fn sidecar_path(file: &Path) -> PathBuf {
    file.with_extension("json")
}

/// Merge upload fields into an existing sidecar document.
///
/// A non-object `existing` is discarded. An empty `url` keeps the
/// previously recorded one.
#[must_use]
pub fn merge_sidecar(
    existing: Option<Value>,
    url: &str,
    bucket: &str,
    key: &str,
    updated_at: &str,
) -> Value {
    let mut meta = match existing {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let url = if url.is_empty() {
        meta.get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    } else {
        url.to_string()
    };
    let source = meta
        .get("source")
        .cloned()
        .unwrap_or_else(|| Value::from(DEFAULT_SOURCE));

    meta.insert("url".into(), Value::from(url));
    meta.insert("r2Bucket".into(), Value::from(bucket));
    meta.insert("r2Key".into(), Value::from(key));
    meta.insert("source".into(), source);
    meta.insert("updatedAt".into(), Value::from(updated_at));
    Value::Object(meta)
}

/// Read, merge and rewrite the sidecar of `file`.
///
/// # Errors
///
/// Returns [`UploadError::Metadata`] if the sidecar cannot be written.
pub fn write_sidecar(
    file: &Path,
    url: &str,
    bucket: &str,
    key: &str,
) -> Result<PathBuf, UploadError> {
    let path = sidecar_path(file);
    let existing = std::fs::read_to_string(&path)
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok());
    let updated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
    let merged = merge_sidecar(existing, url, bucket, key, &updated_at);
    let text = serde_json::to_string_pretty(&merged).map_err(|e| UploadError::Metadata {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    std::fs::write(&path, text).map_err(|e| UploadError::Metadata {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

/// A place objects can be put.
pub trait ObjectStore {
    /// Bucket name recorded in sidecars.
    fn bucket(&self) -> &str;

    /// Upload `file` under `key`, returning its public URL if one exists.
    ///
    /// # Errors
    ///
    /// Returns an [`UploadError`] on any failure.
    fn put(&self, file: &Path, key: &str) -> Result<Option<String>, UploadError>;
}

/// Blocking client for the R2 object API.
#[derive(Debug, Clone)]
pub struct R2Uploader {
    config: R2Config,
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl R2Uploader {
    /// Client with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Request`] if the HTTP client cannot be built.
    pub fn new(config: R2Config, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UploadError::Request {
                key: String::new(),
                reason: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            config,
            client,
            timeout,
        })
    }

    /// Object endpoint for `key`; each key segment is percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::Request`] if the URL cannot be formed.
    pub fn endpoint(&self, key: &str) -> Result<reqwest::Url, UploadError> {
        let bad = |reason: String| UploadError::Request {
            key: key.to_string(),
            reason,
        };
        let mut url = reqwest::Url::parse(API_ROOT).map_err(|e| bad(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| bad("API root cannot take path segments".to_string()))?
            .push(&self.config.account_id)
            .extend(["r2", "buckets"])
            .push(&self.config.bucket)
            .push("objects")
            .extend(key.split('/'));
        Ok(url)
    }
}

impl ObjectStore for R2Uploader {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    fn put(&self, file: &Path, key: &str) -> Result<Option<String>, UploadError> {
        let body = std::fs::read(file).map_err(|source| UploadError::Io {
            path: file.to_path_buf(),
            source,
        })?;
        let url = self.endpoint(key)?;
        debug!(%key, bytes = body.len(), "uploading");

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.config.api_token)
            .header(reqwest::header::CONTENT_TYPE, content_type(file))
            .body(body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    UploadError::Timeout {
                        key: key.to_string(),
                        seconds: self.timeout.as_secs(),
                    }
                } else {
                    UploadError::Request {
                        key: key.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status {
                key: key.to_string(),
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }
        Ok(self
            .config
            .public_base
            .as_deref()
            .map(|base| public_url(base, key)))
    }
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uploaded {
    /// File name within the run directory.
    pub file_name: String,
    /// Object key.
    pub key: String,
    /// Public URL, when the bucket has one.
    pub url: Option<String>,
}

/// Upload every file in `files` under `prefix` and refresh its sidecar.
///
/// Stops at the first failure.
///
/// # Errors
///
/// Returns the first [`UploadError`] raised.
pub fn publish(
    store: &dyn ObjectStore,
    files: &[PathBuf],
    prefix: &str,
) -> Result<Vec<Uploaded>, UploadError> {
    let mut uploaded = Vec::with_capacity(files.len());
    for file in files {
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let key = object_key(prefix, &file_name);
        info!(file = %file.display(), bucket = store.bucket(), %key, "uploading artifact");
        let url = store.put(file, &key)?;
        write_sidecar(file, url.as_deref().unwrap_or_default(), store.bucket(), &key)?;
        match &url {
            Some(url) => info!(%url, "uploaded"),
            None => info!("uploaded (no public URL; set R2_PUBLIC_BASE_URL)"),
        }
        uploaded.push(Uploaded {
            file_name,
            key,
            url,
        });
    }
    Ok(uploaded)
}

/// Attach each upload's URL to the matching manifest entries.
pub fn attach_urls(manifest: &mut Manifest, uploaded: &[Uploaded]) {
    for item in uploaded {
        if let Some(url) = &item.url {
            manifest.attach_url(&item.file_name, url);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use magnify_pipeline::Artifact;
    use serde_json::json;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn credentials_use_fallback_names() {
        let config = R2Config::from_lookup(lookup(&[
            ("CLOUDFLARE_ACCOUNT_ID", "acct"),
            ("CLOUDFLARE_API_TOKEN", "tok"),
            ("R2_BUCKET", "  "),
            ("BUCKET", "fallback"),
            ("PUBLIC_URL", "https://cdn.example/"),
        ]))
        .unwrap();
        assert_eq!(config.bucket, "fallback");
        assert_eq!(config.public_base.as_deref(), Some("https://cdn.example/"));
        assert!(!format!("{config:?}").contains("tok"));
    }

    #[test]
    fn missing_credentials_are_named() {
        let err = R2Config::from_lookup(lookup(&[("CLOUDFLARE_ACCOUNT_ID", "a")])).unwrap_err();
        assert!(matches!(&err, UploadError::MissingCredentials(what) if what == "API token, bucket"));
    }

    #[test]
    fn env_file_parsing() {
        let vars = parse_env_file(
            "# comment\n\nCLOUDFLARE_API_TOKEN = 'secret'\nR2_BUCKET=\"b\"\nnoequals\nR2_BUCKET=later\n",
        );
        assert_eq!(vars.get("CLOUDFLARE_API_TOKEN").map(String::as_str), Some("secret"));
        assert_eq!(vars.get("R2_BUCKET").map(String::as_str), Some("b"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn keys_and_urls() {
        assert_eq!(object_key("/case/run-1/", "a.png"), "case/run-1/a.png");
        assert_eq!(object_key("", "a.png"), "a.png");
        assert_eq!(public_url("https://cdn/", "p/a.png"), "https://cdn/p/a.png");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type(Path::new("x.PNG")), "image/png");
        assert_eq!(content_type(Path::new("x_text.svg")), "image/svg+xml");
        assert_eq!(content_type(Path::new("compare.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn endpoint_encodes_segments_but_keeps_key_slashes() {
        let uploader = R2Uploader::new(
            R2Config {
                account_id: "acct".into(),
                api_token: "t".into(),
                bucket: "my bucket".into(),
                public_base: None,
            },
            Duration::from_secs(5),
        )
        .unwrap();
        let url = uploader.endpoint("run 1/original.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.cloudflare.com/client/v4/accounts/acct/r2/buckets/my%20bucket/objects/run%201/original.png"
        );
    }

    #[test]
    fn sidecar_merge_preserves_foreign_fields() {
        let existing = json!({"title": "keep me", "url": "https://old/a.png", "source": "manual"});
        let merged = merge_sidecar(Some(existing), "", "b", "p/a.png", "2026-01-01T00:00:00Z");
        assert_eq!(merged["title"], "keep me");
        assert_eq!(merged["url"], "https://old/a.png");
        assert_eq!(merged["source"], "manual");
        assert_eq!(merged["r2Bucket"], "b");
        assert_eq!(merged["r2Key"], "p/a.png");
        assert_eq!(merged["updatedAt"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn sidecar_merge_defaults() {
        let merged = merge_sidecar(Some(json!([1, 2])), "https://new", "b", "k", "t");
        assert_eq!(merged["url"], "https://new");
        assert_eq!(merged["source"], DEFAULT_SOURCE);
    }

    struct MemoryStore {
        keys: RefCell<Vec<String>>,
    }

    impl ObjectStore for MemoryStore {
        fn bucket(&self) -> &str {
            "mem"
        }

        fn put(&self, _file: &Path, key: &str) -> Result<Option<String>, UploadError> {
            self.keys.borrow_mut().push(key.to_string());
            Ok(Some(public_url("https://cdn", key)))
        }
    }

    #[test]
    fn publish_writes_sidecars_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("original.png");
        std::fs::write(&png, b"png").unwrap();
        let page = dir.path().join("compare.html");
        std::fs::write(&page, b"<html>").unwrap();

        let store = MemoryStore {
            keys: RefCell::new(Vec::new()),
        };
        let uploaded = publish(&store, &[png, page], "case/1").unwrap();
        assert_eq!(
            *store.keys.borrow(),
            vec!["case/1/original.png", "case/1/compare.html"]
        );

        let sidecar: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("original.json")).unwrap())
                .unwrap();
        assert_eq!(sidecar["url"], "https://cdn/case/1/original.png");
        assert!(sidecar["updatedAt"].as_str().unwrap().ends_with('Z'));

        let mut manifest = Manifest::new("t");
        manifest.push(Artifact::new("Original", "original.png", ""));
        attach_urls(&mut manifest, &uploaded);
        assert_eq!(
            manifest.items[0].url.as_deref(),
            Some("https://cdn/case/1/original.png")
        );
    }
}
