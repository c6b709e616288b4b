//! Model artifact discovery.
//!
//! Each [`SearchStrategy`] contributes an ordered list of candidate
//! directories; [`ModelResolver`] walks them first-success and, when
//! allowed, falls back to downloading into the relative cache under the
//! start directory.

use std::path::{Path, PathBuf};

use magnify_pipeline::{ModelKind, ModelLocator, ModelSpec, ResolveError};
use tracing::{debug, info};

use crate::fetch::{HttpFetcher, ModelFetcher};
use crate::settings::ModelSearch;

/// One place models may live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStrategy {
    /// A directory given explicitly.
    Explicit(PathBuf),
    /// A directory named by the environment.
    Environment(PathBuf),
    /// The relative cache in `start` and every ancestor of it.
    Ancestors {
        /// First directory checked.
        start: PathBuf,
    },
    /// The fixed caches under a home directory.
    Home {
        /// The home directory.
        home: PathBuf,
    },
}

impl SearchStrategy {
    /// Candidate directories, most preferred first.
    #[must_use]
    pub fn directories(&self) -> Vec<PathBuf> {
        match self {
            Self::Explicit(dir) | Self::Environment(dir) => vec![dir.clone()],
            Self::Ancestors { start } => start
                .ancestors()
                .map(|dir| dir.join(ModelSearch::RELATIVE_CACHE))
                .collect(),
            Self::Home { home } => ModelSearch::HOME_CACHES
                .iter()
                .map(|rel| home.join(rel))
                .collect(),
        }
    }

    /// The first directory holding `file`, if any.
    #[must_use]
    pub fn find(&self, file: &str) -> Option<PathBuf> {
        self.directories()
            .into_iter()
            .map(|dir| dir.join(file))
            .find(|path| path.is_file())
    }
}

/// Locates model files on disk, optionally downloading missing ones.
pub struct ModelResolver {
    strategies: Vec<SearchStrategy>,
    fetch: Option<(PathBuf, Box<dyn ModelFetcher>)>,
}

impl ModelResolver {
    /// A resolver over `strategies` that never downloads.
    #[must_use]
    pub fn new(strategies: Vec<SearchStrategy>) -> Self {
        Self {
            strategies,
            fetch: None,
        }
    }

    /// Allow downloads into `dir` through `fetcher`.
    #[must_use]
    pub fn with_fetch(mut self, dir: impl Into<PathBuf>, fetcher: Box<dyn ModelFetcher>) -> Self {
        self.fetch = Some((dir.into(), fetcher));
        self
    }

    /// Build the standard search order from `search`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Fetch`] if fetching is allowed but the
    /// HTTP client cannot be created.
    pub fn from_search(search: &ModelSearch) -> Result<Self, ResolveError> {
        let mut strategies = Vec::new();
        if let Some(dir) = &search.explicit_dir {
            strategies.push(SearchStrategy::Explicit(dir.clone()));
        }
        if let Some(dir) = &search.env_dir {
            strategies.push(SearchStrategy::Environment(dir.clone()));
        }
        strategies.push(SearchStrategy::Ancestors {
            start: search.start_dir.clone(),
        });
        if let Some(home) = &search.home_dir {
            strategies.push(SearchStrategy::Home { home: home.clone() });
        }

        let resolver = Self::new(strategies);
        if search.allow_fetch {
            let fetcher = HttpFetcher::new(search.fetch_timeout)?;
            Ok(resolver.with_fetch(search.fetch_dir(), Box::new(fetcher)))
        } else {
            Ok(resolver)
        }
    }

    /// Every candidate directory in search order, without repeats.
    #[must_use]
    pub fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut seen = Vec::new();
        for dir in self.strategies.iter().flat_map(SearchStrategy::directories) {
            if !seen.contains(&dir) {
                seen.push(dir);
            }
        }
        seen
    }

    fn download(
        &self,
        kind: ModelKind,
        dir: &Path,
        fetcher: &dyn ModelFetcher,
    ) -> Result<PathBuf, ResolveError> {
        std::fs::create_dir_all(dir).map_err(|e| ResolveError::Fetch {
            url: kind.url().to_string(),
            reason: format!("failed to create {}: {e}", dir.display()),
        })?;
        let dest = dir.join(kind.file_name());
        fetcher.fetch(kind.url(), &dest)?;
        Ok(dest)
    }
}

impl std::fmt::Debug for ModelResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelResolver")
            .field("strategies", &self.strategies)
            .field("fetch_dir", &self.fetch.as_ref().map(|(dir, _)| dir))
            .finish()
    }
}

impl ModelLocator for ModelResolver {
    fn locate(&self, kind: ModelKind) -> Result<ModelSpec, ResolveError> {
        let file = kind.file_name();
        if let Some(path) = self.strategies.iter().find_map(|s| s.find(file)) {
            debug!(%kind, path = %path.display(), "model found");
            return Ok(ModelSpec { kind, path });
        }

        if let Some((dir, fetcher)) = &self.fetch {
            info!(%kind, "model not cached, fetching");
            let path = self.download(kind, dir, fetcher.as_ref())?;
            return Ok(ModelSpec { kind, path });
        }

        Err(ResolveError::NotFound {
            kind,
            searched: self
                .candidate_dirs()
                .into_iter()
                .map(|dir| dir.join(file))
                .collect(),
        })
    }
}
