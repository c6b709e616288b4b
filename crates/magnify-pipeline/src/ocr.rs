//! OCR word records and the tabular result parser.
//!
//! The recognizer is an external collaborator behind [`OcrEngine`]; it
//! hands back raw tab-separated output and [`parse_tsv`] turns that into
//! filtered [`OcrWord`]s. Only words that pass every filter here ever
//! reach the overlay renderer.

use std::path::PathBuf;

use image::RgbImage;
use tracing::debug;

use crate::types::Availability;

/// A recognized word in the pixel space of the image it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    /// Left edge.
    pub left: i32,
    /// Top edge.
    pub top: i32,
    /// Box width; always positive.
    pub width: i32,
    /// Box height; always positive.
    pub height: i32,
    /// Recognizer confidence, 0-100.
    pub confidence: f64,
    /// Trimmed, non-empty text.
    pub text: String,
}

/// What the recognizer is asked to read.
#[derive(Debug, Clone, Copy)]
pub struct OcrRequest<'a> {
    /// On-disk copy of the image, for engines that read files.
    pub image_path: &'a std::path::Path,
    /// The same image in memory.
    pub image: &'a RgbImage,
    /// Language code, e.g. `eng`.
    pub language: &'a str,
    /// Page-segmentation mode.
    pub page_segmentation: u32,
}

/// Failure of the OCR collaborator.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// The engine is not installed or not runnable.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// The engine ran but reported failure.
    #[error("OCR failed: {0}")]
    Failed(String),

    /// The engine did not finish in time.
    #[error("OCR timed out after {seconds}s on {path}")]
    Timeout {
        /// Image being read.
        path: PathBuf,
        /// Configured limit.
        seconds: u64,
    },
}

/// An optical character recognizer producing tabular word output.
pub trait OcrEngine {
    /// Whether the engine can run.
    fn probe(&self) -> Availability;

    /// Recognize text and return the raw TSV (header row plus one row
    /// per detected element).
    ///
    /// # Errors
    ///
    /// Returns an [`OcrError`] if the engine cannot run or fails.
    fn recognize(&self, request: &OcrRequest<'_>) -> Result<String, OcrError>;
}

/// Parse TSV recognizer output into filtered words.
///
/// Blank lines are ignored. Columns are located by header name (`left`,
/// `top`, `width`, `height`, `conf`, `text`). A row is kept only if it has as many
/// fields as the header, its trimmed text is non-empty, its confidence
/// is at least `min_confidence` (an unparsable confidence counts as -1),
/// and its geometry parses with width and height above zero. Geometry
/// may be written as floats; the fractional part is dropped.
#[must_use]
pub fn parse_tsv(tsv: &str, min_confidence: f64) -> Vec<OcrWord> {
    let mut lines = tsv.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let header: Vec<&str> = header.split('\t').map(str::trim).collect();
    let column = |name: &str| header.iter().position(|h| *h == name);
    let (Some(left), Some(top), Some(width), Some(height), Some(conf), Some(text)) = (
        column("left"),
        column("top"),
        column("width"),
        column("height"),
        column("conf"),
        column("text"),
    ) else {
        debug!("OCR output lacks expected columns");
        return Vec::new();
    };

    let mut words = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != header.len() {
            continue;
        }
        let word = fields[text].trim();
        if word.is_empty() {
            continue;
        }
        let confidence = fields[conf]
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|c| c.is_finite())
            .unwrap_or(-1.0);
        if confidence < min_confidence {
            continue;
        }
        let (Some(l), Some(t), Some(w), Some(h)) = (
            parse_coord(fields[left]),
            parse_coord(fields[top]),
            parse_coord(fields[width]),
            parse_coord(fields[height]),
        ) else {
            continue;
        };
        if w <= 0 || h <= 0 {
            continue;
        }
        words.push(OcrWord {
            left: l,
            top: t,
            width: w,
            height: h,
            confidence,
            text: word.to_string(),
        });
    }
    words
}

/// Integer or float-formatted integer, truncated toward zero.
fn parse_coord(field: &str) -> Option<i32> {
    let field = field.trim();
    if let Ok(v) = field.parse::<i32>() {
        return Some(v);
    }
    let v = field.parse::<f64>().ok().filter(|v| v.is_finite())?;
    let v = v.trunc();
    if v < f64::from(i32::MIN) || v > f64::from(i32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let v = v as i32;
    Some(v)
}
