//! Deconstructor contract: `extract(path) -> text`.
//!
//! Per-format extraction internals (PDF, OCR, transcription) live behind
//! this trait; the pipeline only depends on the contract. The shipped
//! implementation handles plain-text formats.

pub mod text;

pub use text::PlainTextDeconstructor;

use std::path::Path;

use thiserror::Error;

/// Every failure mode the pipeline distinguishes. Blanket suppression is
/// deliberately impossible: callers must route each variant through the
/// skip/log taxonomy.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unreadable file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("File too large ({size} bytes, limit {limit}): {path}")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("Unsupported format '{extension}': {path}")]
    UnsupportedFormat { path: String, extension: String },
}

impl ExtractError {
    /// Short reason label for skip events and the audit log.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unreadable { .. } => "unreadable",
            Self::TooLarge { .. } => "too_large",
            Self::UnsupportedFormat { .. } => "unsupported_format",
        }
    }
}

/// Transforms one evidence file into analyzable text.
///
/// Implementations are called from parallel extraction workers and must be
/// `Send + Sync`. Returning an empty string is valid (an image with no
/// recognizable text); the scheduler drops empty windows silently.
pub trait Deconstructor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String, ExtractError>;
}
