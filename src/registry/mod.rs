//! Fingerprint Registry: content-addressed discovery of the evidence tree.
//!
//! The registry is the sole producer of work for the analysis pipeline.
//! Every discovered file is durably recorded with `processed = 0` before it
//! is handed downstream, so a crash before processing leaves a resumable
//! record rather than a lost one.

pub mod fingerprint;
pub mod scanner;
pub mod store;

pub use fingerprint::{fingerprint_file, FileStamp};
pub use scanner::{DiscoveryReport, RegistryScanner};
pub use store::{FingerprintRecord, NewRecord, PendingFile};

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unreadable file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Discovery cancelled")]
    Cancelled,
}
