//! Typed row access for the registry table.
//!
//! All writes use `INSERT OR IGNORE` so re-discovery of an unchanged tree is
//! idempotent. The `processed` flag is flipped only by the intelligence
//! store's commit transaction, never here.

use std::collections::HashMap;

use rusqlite::{params, Connection};

use super::fingerprint::FileStamp;
use super::RegistryError;

/// A persisted registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub fingerprint: String,
    pub path: String,
    pub size: u64,
    pub mtime: i64,
    pub discovered_at: String,
    pub processed: bool,
}

/// A newly discovered file, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub fingerprint: String,
    pub path: String,
    pub stamp: FileStamp,
}

/// One unit of pending work handed to the batch scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub fingerprint: String,
    pub path: String,
}

/// Load `path -> (size, mtime)` for the cheap unchanged-file skip check.
/// A path can carry several rows after a content change; rowid order makes
/// the newest stamp win so an old stamp cannot force a re-hash every scan.
pub fn load_path_index(conn: &Connection) -> Result<HashMap<String, FileStamp>, RegistryError> {
    let mut stmt = conn.prepare("SELECT path, size, mtime FROM registry ORDER BY rowid")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            FileStamp {
                size: row.get::<_, i64>(1)? as u64,
                mtime: row.get(2)?,
            },
        ))
    })?;

    let mut index = HashMap::new();
    for row in rows {
        let (path, stamp) = row?;
        index.insert(path, stamp);
    }
    Ok(index)
}

/// Persist a batch of discovered records in one transaction.
/// Returns the number of rows actually inserted (duplicates ignored).
///
/// A re-hashed path whose content changed supersedes its own stale pending
/// rows in the same transaction: the old fingerprint must not stay queued
/// for a file that no longer carries those bytes. Rows already processed
/// are kept as the audit trail of what was analyzed.
pub fn insert_records(conn: &Connection, records: &[NewRecord]) -> Result<u64, RegistryError> {
    if records.is_empty() {
        return Ok(0);
    }

    let discovered_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0u64;
    {
        let mut supersede = tx.prepare(
            "DELETE FROM registry WHERE path = ?1 AND fingerprint <> ?2 AND processed = 0",
        )?;
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO registry (fingerprint, path, size, mtime, discovered_at, processed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
        )?;
        for record in records {
            supersede.execute(params![record.path, record.fingerprint])?;
            inserted += stmt.execute(params![
                record.fingerprint,
                record.path,
                record.stamp.size as i64,
                record.stamp.mtime,
                discovered_at,
            ])? as u64;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

/// Next page of unprocessed work in discovery order.
///
/// Rows are grouped by fingerprint: two paths with identical bytes yield one
/// unit of work, and committing it flips every row carrying that fingerprint.
pub fn pending_files(conn: &Connection, limit: usize) -> Result<Vec<PendingFile>, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT fingerprint, MIN(path) FROM registry
         WHERE processed = 0
         GROUP BY fingerprint
         ORDER BY MIN(rowid)
         LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |row| {
        Ok(PendingFile {
            fingerprint: row.get(0)?,
            path: row.get(1)?,
        })
    })?;

    let mut pending = Vec::new();
    for row in rows {
        pending.push(row?);
    }
    Ok(pending)
}

/// Count of distinct fingerprints already marked processed.
pub fn processed_count(conn: &Connection) -> Result<u64, RegistryError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT fingerprint) FROM registry WHERE processed = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

/// Count of distinct fingerprints known to the registry.
pub fn total_count(conn: &Connection) -> Result<u64, RegistryError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT fingerprint) FROM registry",
        [],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn record(fp: &str, path: &str) -> NewRecord {
        NewRecord {
            fingerprint: fp.to_string(),
            path: path.to_string(),
            stamp: FileStamp { size: 10, mtime: 1700000000 },
        }
    }

    #[test]
    fn insert_is_idempotent() {
        let conn = open_memory_database().unwrap();
        let records = vec![record("fp1", "/a"), record("fp2", "/b")];

        assert_eq!(insert_records(&conn, &records).unwrap(), 2);
        assert_eq!(insert_records(&conn, &records).unwrap(), 0);
        assert_eq!(total_count(&conn).unwrap(), 2);
    }

    #[test]
    fn pending_in_discovery_order() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp2", "/b"), record("fp1", "/a")]).unwrap();

        let pending = pending_files(&conn, 10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].fingerprint, "fp2");
        assert_eq!(pending[1].fingerprint, "fp1");
    }

    #[test]
    fn duplicate_content_is_one_unit_of_work() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp1", "/a"), record("fp1", "/copy-of-a")]).unwrap();

        let pending = pending_files(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].path, "/a");
    }

    #[test]
    fn processed_rows_not_pending() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp1", "/a"), record("fp2", "/b")]).unwrap();
        conn.execute("UPDATE registry SET processed = 1 WHERE fingerprint = 'fp1'", [])
            .unwrap();

        let pending = pending_files(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fingerprint, "fp2");
        assert_eq!(processed_count(&conn).unwrap(), 1);
    }

    #[test]
    fn changed_content_supersedes_stale_pending_row() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp-old", "/a")]).unwrap();

        // Same path re-hashed to different bytes before the old row was
        // ever processed: the stale fingerprint must leave the queue.
        insert_records(&conn, &[record("fp-new", "/a")]).unwrap();

        let pending = pending_files(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fingerprint, "fp-new");
        assert_eq!(total_count(&conn).unwrap(), 1);
    }

    #[test]
    fn processed_row_survives_content_change() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp-old", "/a")]).unwrap();
        conn.execute("UPDATE registry SET processed = 1 WHERE fingerprint = 'fp-old'", [])
            .unwrap();

        insert_records(&conn, &[record("fp-new", "/a")]).unwrap();

        // The analyzed row stays as the audit trail; only the new content
        // is pending.
        assert_eq!(total_count(&conn).unwrap(), 2);
        let pending = pending_files(&conn, 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].fingerprint, "fp-new");
    }

    #[test]
    fn supersede_keeps_other_paths_of_the_same_content() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp1", "/a"), record("fp1", "/copy-of-a")]).unwrap();

        insert_records(&conn, &[record("fp2", "/a")]).unwrap();

        let pending = pending_files(&conn, 10).unwrap();
        let fingerprints: Vec<&str> =
            pending.iter().map(|p| p.fingerprint.as_str()).collect();
        assert_eq!(fingerprints, vec!["fp1", "fp2"]);
        assert_eq!(pending[0].path, "/copy-of-a");
    }

    #[test]
    fn path_index_prefers_newest_row() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp-old", "/a")]).unwrap();
        conn.execute("UPDATE registry SET processed = 1 WHERE fingerprint = 'fp-old'", [])
            .unwrap();
        let newer = NewRecord {
            fingerprint: "fp-new".to_string(),
            path: "/a".to_string(),
            stamp: FileStamp { size: 99, mtime: 1800000000 },
        };
        insert_records(&conn, &[newer]).unwrap();

        let index = load_path_index(&conn).unwrap();
        assert_eq!(index.get("/a").unwrap().size, 99);
    }

    #[test]
    fn path_index_contains_stamps() {
        let conn = open_memory_database().unwrap();
        insert_records(&conn, &[record("fp1", "/a")]).unwrap();

        let index = load_path_index(&conn).unwrap();
        assert_eq!(index.get("/a").unwrap().size, 10);
    }

    #[test]
    fn limit_bounds_page() {
        let conn = open_memory_database().unwrap();
        let records: Vec<NewRecord> =
            (0..5).map(|i| record(&format!("fp{i}"), &format!("/f{i}"))).collect();
        insert_records(&conn, &records).unwrap();

        assert_eq!(pending_files(&conn, 3).unwrap().len(), 3);
    }
}
