//! Intelligence: structured facts extracted from evidence windows.
//!
//! The parser tolerates malformed model output; the store is the single
//! write path for facts and for flipping a fingerprint's `processed` flag,
//! keeping both inside one transaction.

pub mod parser;
pub mod store;
pub mod types;

pub use parser::{parse_completion, ParseOutcome};
pub use store::{CommitReport, IntelligenceStore};
pub use types::Fact;

use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum IntelligenceError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
