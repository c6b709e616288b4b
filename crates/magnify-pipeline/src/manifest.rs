//! The ordered record of artifacts a run produced.

use serde::{Deserialize, Serialize};

/// A produced file, as listed in the manifest and comparison page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Human-readable label.
    pub label: String,
    /// File name relative to the output directory.
    pub file: String,
    /// Short description.
    pub note: String,
    /// Public URL, attached after an upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Artifact {
    /// A not-yet-uploaded artifact.
    #[must_use]
    pub fn new(label: impl Into<String>, file: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            file: file.into(),
            note: note.into(),
            url: None,
        }
    }
}

/// Artifacts in the order their stages completed.
///
/// Entries are only ever appended; the order drives the order of the
/// comparison view. The one mutation allowed afterwards is attaching an
/// upload URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Page title.
    pub title: String,
    /// Entries in completion order.
    pub items: Vec<Artifact>,
}

impl Manifest {
    /// Empty manifest with a title.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    /// Append an entry. Duplicates are kept.
    pub fn push(&mut self, artifact: Artifact) {
        self.items.push(artifact);
    }

    /// Attach `url` to every entry whose file is `file`. Returns whether
    /// any entry matched.
    pub fn attach_url(&mut self, file: &str, url: &str) -> bool {
        let mut matched = false;
        for item in self.items.iter_mut().filter(|item| item.file == file) {
            item.url = Some(url.to_string());
            matched = true;
        }
        matched
    }

    /// File names in order.
    #[must_use]
    pub fn files(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.file.as_str()).collect()
    }
}
