//! Overlay font discovery.

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use magnify_pipeline::{Typeface, TypefaceSource};
use tracing::{debug, info, warn};

use crate::settings::FontSearch;

/// Well-known font files, most preferred first.
pub const PLATFORM_FONTS: &[&str] = &[
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "/System/Library/Fonts/Supplemental/Andale Mono.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// [`PLATFORM_FONTS`] as paths.
#[must_use]
pub fn platform_candidates() -> Vec<PathBuf> {
    PLATFORM_FONTS.iter().map(PathBuf::from).collect()
}

/// Resolves the overlay face: explicit path, then the override, then the
/// platform candidates, then the built-in face.
#[derive(Debug, Clone)]
pub struct FontLocator {
    search: FontSearch,
}

impl FontLocator {
    /// Locator over `search`.
    #[must_use]
    pub const fn new(search: FontSearch) -> Self {
        Self { search }
    }

    fn ordered(&self) -> impl Iterator<Item = &Path> {
        self.search
            .explicit
            .iter()
            .chain(self.search.env_override.iter())
            .chain(self.search.candidates.iter())
            .map(PathBuf::as_path)
    }
}

impl TypefaceSource for FontLocator {
    fn typeface(&self) -> Typeface {
        for path in self.ordered() {
            if !path.is_file() {
                continue;
            }
            match load(path) {
                Some(font) => {
                    info!(font = %path.display(), "loaded overlay font");
                    return Typeface::Outline(font);
                }
                None => warn!(font = %path.display(), "unusable font, trying next"),
            }
        }
        debug!("no outline font found, using built-in face");
        Typeface::Builtin
    }
}

fn load(path: &Path) -> Option<FontVec> {
    let data = std::fs::read(path).ok()?;
    FontVec::try_from_vec(data).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nothing_found_falls_back_to_builtin() {
        let locator = FontLocator::new(FontSearch {
            explicit: Some(PathBuf::from("/definitely/missing.ttf")),
            env_override: None,
            candidates: vec![PathBuf::from("/also/missing.ttf")],
        });
        assert!(matches!(locator.typeface(), Typeface::Builtin));
    }

    #[test]
    fn corrupt_font_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("junk.ttf");
        std::fs::write(&junk, b"not a font").unwrap();
        let locator = FontLocator::new(FontSearch {
            explicit: Some(junk),
            env_override: None,
            candidates: Vec::new(),
        });
        assert!(matches!(locator.typeface(), Typeface::Builtin));
    }

    #[test]
    fn explicit_precedes_override_and_candidates() {
        let locator = FontLocator::new(FontSearch {
            explicit: Some(PathBuf::from("a.ttf")),
            env_override: Some(PathBuf::from("b.ttf")),
            candidates: vec![PathBuf::from("c.ttf")],
        });
        let order: Vec<&Path> = locator.ordered().collect();
        assert_eq!(order, vec![Path::new("a.ttf"), Path::new("b.ttf"), Path::new("c.ttf")]);
    }
}
