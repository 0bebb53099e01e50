//! Resumable evidence-tree scanner with parallel content hashing.
//!
//! Discovery never re-hashes a file whose `(path, size, mtime)` already
//! matches a stored row. An unreadable file is logged and skipped; it never
//! aborts the walk.

use std::path::PathBuf;
use std::time::Instant;

use rusqlite::Connection;
use walkdir::WalkDir;

use super::fingerprint::{fingerprint_file, FileStamp};
use super::store::{insert_records, load_path_index, NewRecord};
use super::RegistryError;
use crate::events::{CancelToken, EventSink, PipelineEvent};

/// Rows are committed in batches of this size during hashing.
const COMMIT_BATCH: usize = 1000;
/// A progress event is emitted every this many hashed files.
const PROGRESS_EVERY: u64 = 50;

/// Outcome of one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Files visited by the walk.
    pub scanned: u64,
    /// Rows newly inserted this pass.
    pub new_records: u64,
    /// Files skipped because cheap metadata proved them unchanged.
    pub unchanged: u64,
    /// Files that could not be read or hashed.
    pub unreadable: u64,
}

pub struct RegistryScanner<'a> {
    conn: &'a Connection,
    workers: usize,
    sink: &'a dyn EventSink,
    cancel: CancelToken,
}

impl<'a> RegistryScanner<'a> {
    pub fn new(
        conn: &'a Connection,
        workers: usize,
        sink: &'a dyn EventSink,
        cancel: CancelToken,
    ) -> Self {
        Self {
            conn,
            workers: workers.max(1),
            sink,
            cancel,
        }
    }

    /// Walk `root`, hash anything new or changed, and persist the records.
    pub fn discover(&self, root: &std::path::Path) -> Result<DiscoveryReport, RegistryError> {
        let start = Instant::now();
        let known = load_path_index(self.conn)?;
        tracing::info!(known = known.len(), root = %root.display(), "Registry scan starting");

        let mut report = DiscoveryReport::default();
        let mut candidates: Vec<PathBuf> = Vec::new();

        // Walk in sorted order so discovery order is stable across runs.
        for entry in WalkDir::new(root).sort_by_file_name() {
            if self.cancel.is_cancelled() {
                return Err(RegistryError::Cancelled);
            }
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    report.unreadable += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            report.scanned += 1;

            let path = entry.path().to_path_buf();
            let key = path.display().to_string();
            match (known.get(&key), FileStamp::for_path(&path)) {
                (Some(stored), Ok(stamp)) if *stored == stamp => {
                    report.unchanged += 1;
                }
                (_, Ok(_)) => candidates.push(path),
                (_, Err(e)) => {
                    tracing::warn!(path = %key, error = %e, "Cannot stat file, skipping");
                    self.sink.emit(PipelineEvent::FileSkipped {
                        path: key,
                        reason: e.to_string(),
                    });
                    report.unreadable += 1;
                }
            }
        }

        let total = candidates.len() as u64;
        if total == 0 {
            tracing::info!("Registry up to date, nothing to hash");
        } else {
            tracing::info!(candidates = total, workers = self.workers, "Hashing new files");
            self.hash_candidates(candidates, total, &mut report)?;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        self.sink.emit(PipelineEvent::DiscoveryComplete {
            new_records: report.new_records,
            skipped: report.unchanged + report.unreadable,
            duration_ms,
        });
        tracing::info!(?report, duration_ms, "Registry scan complete");
        Ok(report)
    }

    fn hash_candidates(
        &self,
        candidates: Vec<PathBuf>,
        total: u64,
        report: &mut DiscoveryReport,
    ) -> Result<(), RegistryError> {
        let (work_tx, work_rx) = crossbeam_channel::unbounded::<PathBuf>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<HashOutcome>();

        for path in candidates {
            // Unbounded local queue; the full candidate list is already in memory.
            let _ = work_tx.send(path);
        }
        drop(work_tx);

        std::thread::scope(|scope| -> Result<(), RegistryError> {
            for _ in 0..self.workers {
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                let cancel = self.cancel.clone();
                scope.spawn(move || {
                    for path in work_rx.iter() {
                        // Checked per file so a cancelled scan does not hash
                        // the rest of the queue before the pool can join.
                        if cancel.is_cancelled() {
                            break;
                        }
                        let outcome = hash_one(path);
                        if result_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(result_tx);

            let mut batch: Vec<NewRecord> = Vec::with_capacity(COMMIT_BATCH);
            let mut hashed = 0u64;

            for outcome in result_rx.iter() {
                if self.cancel.is_cancelled() {
                    // Persist what finished, then stop; the rest is picked up
                    // by the next pass.
                    report.new_records += insert_records(self.conn, &batch)?;
                    return Err(RegistryError::Cancelled);
                }

                hashed += 1;
                match outcome {
                    HashOutcome::Hashed(record) => batch.push(record),
                    HashOutcome::Failed { path, error } => {
                        tracing::warn!(path = %path, error = %error, "Hashing failed, skipping file");
                        self.sink.emit(PipelineEvent::FileSkipped {
                            path,
                            reason: error,
                        });
                        report.unreadable += 1;
                    }
                }

                if hashed % PROGRESS_EVERY == 0 {
                    self.sink.emit(PipelineEvent::DiscoveryProgress {
                        scanned: hashed,
                        total,
                    });
                }
                if batch.len() >= COMMIT_BATCH {
                    report.new_records += insert_records(self.conn, &batch)?;
                    batch.clear();
                }
            }

            report.new_records += insert_records(self.conn, &batch)?;
            Ok(())
        })
    }
}

enum HashOutcome {
    Hashed(NewRecord),
    Failed { path: String, error: String },
}

fn hash_one(path: PathBuf) -> HashOutcome {
    let key = path.display().to_string();
    let stamp = match FileStamp::for_path(&path) {
        Ok(s) => s,
        Err(e) => {
            return HashOutcome::Failed {
                path: key,
                error: e.to_string(),
            }
        }
    };
    match fingerprint_file(&path) {
        Ok(fingerprint) => HashOutcome::Hashed(NewRecord {
            fingerprint,
            path: key,
            stamp,
        }),
        Err(e) => HashOutcome::Failed {
            path: key,
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::events::NullSink;
    use crate::registry::store::{pending_files, total_count};

    fn seed_tree(dir: &std::path::Path, files: &[(&str, &str)]) {
        for (name, body) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, body).unwrap();
        }
    }

    #[test]
    fn discovers_and_persists_tree() {
        let dir = tempfile::tempdir().unwrap();
        seed_tree(dir.path(), &[("a.txt", "alpha"), ("sub/b.txt", "bravo")]);
        let conn = open_memory_database().unwrap();

        let scanner = RegistryScanner::new(&conn, 2, &NullSink, CancelToken::new());
        let report = scanner.discover(dir.path()).unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.new_records, 2);
        assert_eq!(total_count(&conn).unwrap(), 2);
        assert_eq!(pending_files(&conn, 10).unwrap().len(), 2);
    }

    #[test]
    fn second_pass_on_unchanged_tree_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        seed_tree(dir.path(), &[("a.txt", "alpha"), ("b.txt", "bravo")]);
        let conn = open_memory_database().unwrap();
        let scanner = RegistryScanner::new(&conn, 2, &NullSink, CancelToken::new());

        scanner.discover(dir.path()).unwrap();
        let second = scanner.discover(dir.path()).unwrap();

        assert_eq!(second.new_records, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(total_count(&conn).unwrap(), 2);
    }

    #[test]
    fn identical_content_collapses_to_one_pending_unit() {
        let dir = tempfile::tempdir().unwrap();
        seed_tree(dir.path(), &[("a.txt", "same bytes"), ("b.txt", "same bytes")]);
        let conn = open_memory_database().unwrap();

        let scanner = RegistryScanner::new(&conn, 1, &NullSink, CancelToken::new());
        scanner.discover(dir.path()).unwrap();

        assert_eq!(pending_files(&conn, 10).unwrap().len(), 1);
    }

    #[test]
    fn changed_file_is_rehashed_and_stale_row_superseded() {
        let dir = tempfile::tempdir().unwrap();
        seed_tree(dir.path(), &[("a.txt", "version one")]);
        let conn = open_memory_database().unwrap();
        let scanner = RegistryScanner::new(&conn, 1, &NullSink, CancelToken::new());
        scanner.discover(dir.path()).unwrap();

        // Rewrite with different content and size before the first version
        // was analyzed. The old fingerprint no longer describes any bytes
        // on disk, so exactly the current content may stay queued.
        seed_tree(dir.path(), &[("a.txt", "a longer version two")]);
        let report = scanner.discover(dir.path()).unwrap();

        assert_eq!(report.new_records, 1);
        let pending = pending_files(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(
            pending[0].fingerprint,
            crate::registry::fingerprint_file(std::path::Path::new(&pending[0].path)).unwrap()
        );
    }

    #[test]
    fn rescan_after_change_skips_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        seed_tree(dir.path(), &[("a.txt", "version one")]);
        let conn = open_memory_database().unwrap();
        let scanner = RegistryScanner::new(&conn, 1, &NullSink, CancelToken::new());
        scanner.discover(dir.path()).unwrap();

        seed_tree(dir.path(), &[("a.txt", "a longer version two")]);
        scanner.discover(dir.path()).unwrap();

        // Third pass: the stamp of the newest row must prove the file
        // unchanged, not the stale stamp of the first version.
        let third = scanner.discover(dir.path()).unwrap();
        assert_eq!(third.new_records, 0);
        assert_eq!(third.unchanged, 1);
    }

    #[test]
    fn cancelled_scan_returns_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        seed_tree(dir.path(), &[("a.txt", "alpha")]);
        let conn = open_memory_database().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let scanner = RegistryScanner::new(&conn, 1, &NullSink, cancel);
        assert!(matches!(
            scanner.discover(dir.path()),
            Err(RegistryError::Cancelled)
        ));
    }

    #[test]
    fn cancel_during_hashing_persists_partial_progress_and_stops() {
        /// Cancels the shared token on the first progress event, simulating
        /// an operator stopping a scan mid-hash.
        struct CancelOnProgress {
            token: CancelToken,
        }
        impl EventSink for CancelOnProgress {
            fn emit(&self, event: PipelineEvent) {
                if matches!(event, PipelineEvent::DiscoveryProgress { .. }) {
                    self.token.cancel();
                }
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let total = PROGRESS_EVERY as usize + 10;
        for i in 0..total {
            std::fs::write(dir.path().join(format!("f{i:03}.txt")), format!("body {i}")).unwrap();
        }

        let conn = open_memory_database().unwrap();
        let cancel = CancelToken::new();
        let sink = CancelOnProgress {
            token: cancel.clone(),
        };
        let scanner = RegistryScanner::new(&conn, 1, &sink, cancel);

        assert!(matches!(
            scanner.discover(dir.path()),
            Err(RegistryError::Cancelled)
        ));

        // The batch in flight at cancellation is persisted; the remainder
        // stays undiscovered for the next pass.
        let persisted = total_count(&conn).unwrap();
        assert!(persisted >= PROGRESS_EVERY);
        assert!((persisted as usize) < total);
    }

    #[test]
    fn discovery_order_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        seed_tree(dir.path(), &[("c.txt", "cc"), ("a.txt", "aa"), ("b.txt", "bb")]);
        let conn = open_memory_database().unwrap();

        let scanner = RegistryScanner::new(&conn, 1, &NullSink, CancelToken::new());
        scanner.discover(dir.path()).unwrap();

        let pending = pending_files(&conn, 10).unwrap();
        let paths: Vec<&str> = pending
            .iter()
            .map(|p| p.path.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(paths, vec!["a.txt", "b.txt", "c.txt"]);
    }
}
