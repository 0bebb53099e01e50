//! SQLite connection management and migrations.
//!
//! The `Database` handle owns the file path and journal policy and mints
//! configured connections. Components hold the connections they need for
//! their lifetime; nothing opens a connection through a global map.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use super::DatabaseError;

/// Explicit database handle with a defined lifetime.
///
/// Case files frequently live on network shares (CIFS/SMB), where WAL
/// journaling corrupts. Journal mode is chosen per path at open time.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection, configure pragmas, and run pending migrations.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = Connection::open(&self.path)?;
        configure_pragmas(&conn, is_network_path(&self.path))?;
        run_migrations(&conn)?;
        Ok(conn)
    }
}

/// Open an in-memory database (for testing).
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn, false)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Network shares must use DELETE journaling; local disks get WAL.
fn is_network_path(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.starts_with("/mnt/") || s.starts_with("//") || s.starts_with(r"\\")
}

fn configure_pragmas(conn: &Connection, network: bool) -> Result<(), DatabaseError> {
    let journal = if network { "DELETE" } else { "WAL" };
    conn.execute_batch(&format!(
        "PRAGMA journal_mode={journal};
         PRAGMA synchronous=NORMAL;
         PRAGMA busy_timeout=60000;
         PRAGMA foreign_keys=ON;"
    ))?;
    Ok(())
}

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../migrations/001_initial.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }

    Ok(())
}

/// Current schema version (0 if no schema exists yet).
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}
