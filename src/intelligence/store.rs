//! Durable, dedup-on-write fact store.
//!
//! `commit` is the only code path that inserts facts or flips a registry
//! row's `processed` flag, and it does both inside one transaction: either
//! every fact for the fingerprint lands and the flag flips, or neither
//! happens and the fingerprint is retried on resume.

use rusqlite::{params, Connection};

use super::types::Fact;
use super::IntelligenceError;

/// Result of one commit call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Rows newly written.
    pub inserted: u64,
    /// Facts ignored because an identical row already existed (legitimate
    /// on resume after a partially observed crash).
    pub deduplicated: u64,
}

pub struct IntelligenceStore {
    conn: Connection,
}

impl IntelligenceStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Commit all facts for one fingerprint and mark it processed,
    /// atomically. Facts are written in window order. Rollback on any
    /// failure leaves `processed = 0`.
    pub fn commit(
        &self,
        fingerprint: &str,
        facts: &[Fact],
    ) -> Result<CommitReport, IntelligenceError> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = CommitReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO intelligence
                 (fingerprint, window_index, evidence_quote, associated_date,
                  fact_summary, category, identified_crime, severity_score, date_valid)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for fact in facts {
                let changed = stmt.execute(params![
                    fingerprint,
                    fact.window_index as i64,
                    fact.quote,
                    fact.date,
                    fact.summary,
                    fact.category,
                    fact.crime,
                    fact.severity,
                    fact.date_valid as i64,
                ])?;
                if changed > 0 {
                    report.inserted += 1;
                } else {
                    report.deduplicated += 1;
                }
            }
        }
        tx.execute(
            "UPDATE registry SET processed = 1 WHERE fingerprint = ?1",
            params![fingerprint],
        )?;
        tx.commit()?;
        Ok(report)
    }

    pub fn fact_count(&self) -> Result<u64, IntelligenceError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM intelligence", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Facts for one fingerprint in window order (then by quote for a
    /// stable tiebreak).
    pub fn facts_for_fingerprint(&self, fingerprint: &str) -> Result<Vec<Fact>, IntelligenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT fingerprint, window_index, evidence_quote, associated_date,
                    fact_summary, category, identified_crime, severity_score, date_valid
             FROM intelligence WHERE fingerprint = ?1
             ORDER BY window_index, evidence_quote",
        )?;
        let rows = stmt.query_map(params![fingerprint], row_to_fact)?;
        collect(rows)
    }

    /// Full ordered dump for the visualization layer: by date string, then
    /// fingerprint, then window.
    pub fn all_facts(&self) -> Result<Vec<Fact>, IntelligenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT fingerprint, window_index, evidence_quote, associated_date,
                    fact_summary, category, identified_crime, severity_score, date_valid
             FROM intelligence
             ORDER BY associated_date, fingerprint, window_index",
        )?;
        let rows = stmt.query_map([], row_to_fact)?;
        collect(rows)
    }
}

fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fact> {
    Ok(Fact {
        fingerprint: row.get(0)?,
        window_index: row.get::<_, i64>(1)? as usize,
        quote: row.get(2)?,
        date: row.get(3)?,
        summary: row.get(4)?,
        category: row.get(5)?,
        crime: row.get(6)?,
        severity: row.get(7)?,
        date_valid: row.get::<_, i64>(8)? != 0,
    })
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<Fact>>,
) -> Result<Vec<Fact>, IntelligenceError> {
    let mut facts = Vec::new();
    for row in rows {
        facts.push(row?);
    }
    Ok(facts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::registry::store::{insert_records, pending_files, NewRecord};
    use crate::registry::FileStamp;

    fn store_with_registry(fingerprints: &[&str]) -> IntelligenceStore {
        let conn = open_memory_database().unwrap();
        let records: Vec<NewRecord> = fingerprints
            .iter()
            .map(|fp| NewRecord {
                fingerprint: fp.to_string(),
                path: format!("/evidence/{fp}"),
                stamp: FileStamp { size: 1, mtime: 1 },
            })
            .collect();
        insert_records(&conn, &records).unwrap();
        IntelligenceStore::new(conn)
    }

    fn fact(fp: &str, window: usize, quote: &str) -> Fact {
        Fact {
            fingerprint: fp.to_string(),
            window_index: window,
            quote: quote.to_string(),
            date: "1977-03-14".to_string(),
            summary: format!("summary of {quote}"),
            category: "Financial".to_string(),
            crime: None,
            severity: 2,
            date_valid: true,
        }
    }

    #[test]
    fn commit_writes_facts_and_flips_processed() {
        let store = store_with_registry(&["fp1"]);
        let report = store
            .commit("fp1", &[fact("fp1", 0, "q1"), fact("fp1", 1, "q2")])
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(store.fact_count().unwrap(), 2);
        assert!(pending_files(&store.conn, 10).unwrap().is_empty());
    }

    #[test]
    fn recommit_is_dedup_noop() {
        let store = store_with_registry(&["fp1"]);
        let facts = vec![fact("fp1", 0, "q1")];
        store.commit("fp1", &facts).unwrap();
        let second = store.commit("fp1", &facts).unwrap();

        assert_eq!(second.inserted, 0);
        assert_eq!(second.deduplicated, 1);
        assert_eq!(store.fact_count().unwrap(), 1);
    }

    #[test]
    fn zero_fact_commit_still_marks_processed() {
        let store = store_with_registry(&["fp1"]);
        store.commit("fp1", &[]).unwrap();
        assert!(pending_files(&store.conn, 10).unwrap().is_empty());
    }

    #[test]
    fn commit_flips_every_row_of_the_fingerprint() {
        let conn = open_memory_database().unwrap();
        insert_records(
            &conn,
            &[
                NewRecord {
                    fingerprint: "fp1".to_string(),
                    path: "/a".to_string(),
                    stamp: FileStamp { size: 1, mtime: 1 },
                },
                NewRecord {
                    fingerprint: "fp1".to_string(),
                    path: "/duplicate-of-a".to_string(),
                    stamp: FileStamp { size: 1, mtime: 1 },
                },
            ],
        )
        .unwrap();
        let store = IntelligenceStore::new(conn);

        store.commit("fp1", &[fact("fp1", 0, "q")]).unwrap();
        let unprocessed: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM registry WHERE processed = 0", [], |r| r.get(0))
            .unwrap();
        assert_eq!(unprocessed, 0);
    }

    #[test]
    fn facts_returned_in_window_order() {
        let store = store_with_registry(&["fp1"]);
        store
            .commit("fp1", &[fact("fp1", 2, "late"), fact("fp1", 0, "early")])
            .unwrap();

        let facts = store.facts_for_fingerprint("fp1").unwrap();
        assert_eq!(facts[0].window_index, 0);
        assert_eq!(facts[1].window_index, 2);
    }

    #[test]
    fn roundtrip_preserves_fields() {
        let store = store_with_registry(&["fp1"]);
        let mut original = fact("fp1", 3, "the quote");
        original.crime = Some("Fraud".to_string());
        original.date_valid = false;
        original.date = "Unknown".to_string();
        store.commit("fp1", &[original.clone()]).unwrap();

        let loaded = store.facts_for_fingerprint("fp1").unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn all_facts_ordered_by_date() {
        let store = store_with_registry(&["fp1", "fp2"]);
        let mut late = fact("fp2", 0, "late");
        late.date = "1980-01-01".to_string();
        let mut early = fact("fp1", 0, "early");
        early.date = "1970-01-01".to_string();
        store.commit("fp2", &[late]).unwrap();
        store.commit("fp1", &[early]).unwrap();

        let all = store.all_facts().unwrap();
        assert_eq!(all[0].quote, "early");
        assert_eq!(all[1].quote, "late");
    }
}
