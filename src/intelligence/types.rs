//! The Fact record: one forensic finding, immutable once committed.

use serde::{Deserialize, Serialize};

use crate::timeline::parse_flexible_date;

/// One structured finding traced to exactly one `(fingerprint, window)`
/// pair. Committed facts are never mutated, only flagged by later passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub fingerprint: String,
    pub window_index: usize,
    /// Verbatim source text supporting the finding.
    pub quote: String,
    /// Date string as the model emitted it; see `date_valid`.
    pub date: String,
    pub summary: String,
    pub category: String,
    pub crime: Option<String>,
    /// 1 (minor) to 5 (severe).
    pub severity: i64,
    /// Whether `date` survived the explicit parse step. Facts with an
    /// invalid date land at the board origin; this flag is how callers tell
    /// that fallback from a real fact at the origin.
    pub date_valid: bool,
}

impl Fact {
    /// Re-run the tolerant parse on the stored date string.
    pub fn parsed_date(&self) -> Option<chrono::NaiveDate> {
        parse_flexible_date(&self.date)
    }
}
