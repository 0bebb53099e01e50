//! Checkpoint Manager: the persisted resume cursor.
//!
//! The checkpoint is a cheap hint written strictly after each committed
//! batch; the registry's per-record `processed` flag is the resume source
//! of truth. A crash between commit and checkpoint must read as "not yet
//! recorded", never the reverse, so the file is written atomically via a
//! temp-file rename.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Persisted resume cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Fingerprints fully committed so far. Monotonically non-decreasing.
    pub processed: u64,
    pub last_fp: String,
    pub total_facts: u64,
    /// Unix seconds at save time.
    pub timestamp: i64,
}

pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    /// Checkpoint lives next to the database: `<db>.checkpoint.json`.
    pub fn beside_database(database_path: &Path) -> Self {
        let mut name = database_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "steinline".to_string());
        name.push_str(".checkpoint.json");
        Self {
            path: database_path.with_file_name(name),
        }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persist the cursor. Called only after a successful store commit.
    pub fn save(
        &self,
        processed: u64,
        last_fp: &str,
        total_facts: u64,
    ) -> Result<(), CheckpointError> {
        let state = Checkpoint {
            processed,
            last_fp: last_fp.to_string(),
            total_facts,
            timestamp: chrono::Utc::now().timestamp(),
        };
        let raw = serde_json::to_string(&state)?;

        // Write-then-rename so a crash mid-write leaves the old cursor.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Absent or corrupt file means "start from empty state".
    pub fn load(&self) -> Option<Checkpoint> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring corrupt checkpoint");
                None
            }
        }
    }

    /// Remove the cursor on full-run completion.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::beside_database(&dir.path().join("case.db"));
        assert!(manager.load().is_none());
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::beside_database(&dir.path().join("case.db"));

        manager.save(12, "fp-12", 88).unwrap();
        let state = manager.load().unwrap();
        assert_eq!(state.processed, 12);
        assert_eq!(state.last_fp, "fp-12");
        assert_eq!(state.total_facts, 88);
        assert!(state.timestamp > 0);
    }

    #[test]
    fn save_overwrites_previous_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::beside_database(&dir.path().join("case.db"));

        manager.save(1, "fp-1", 3).unwrap();
        manager.save(2, "fp-2", 9).unwrap();
        assert_eq!(manager.load().unwrap().processed, 2);
    }

    #[test]
    fn clear_removes_cursor_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = CheckpointManager::beside_database(&dir.path().join("case.db"));

        manager.save(1, "fp-1", 0).unwrap();
        manager.clear().unwrap();
        assert!(manager.load().is_none());
        manager.clear().unwrap();
    }

    #[test]
    fn corrupt_file_reads_as_fresh_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.db.checkpoint.json");
        std::fs::write(&path, "{not json").unwrap();

        let manager = CheckpointManager::at_path(&path);
        assert!(manager.load().is_none());
    }

    #[test]
    fn checkpoint_sits_beside_database() {
        let manager = CheckpointManager::beside_database(Path::new("/data/case.db"));
        assert_eq!(
            manager.path,
            PathBuf::from("/data/case.db.checkpoint.json")
        );
    }
}
