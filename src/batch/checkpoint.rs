//! SQLite-backed checkpoint ledger.
//!
//! One row per paper (latest record wins) plus periodic progress snapshots
//! per run. Re-opening a ledger tells the orchestrator which papers are
//! already done; error rows are kept for audit but are retried on resume.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::metrics::MetricsSnapshot;
use super::record::{PaperRecord, PaperStatus, Stamp};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    if current < 1 {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS papers (
                paper_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                processed_at TEXT NOT NULL,
                payload TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_papers_status ON papers(status);
            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                snapshot TEXT NOT NULL
            );",
        )?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

/// Paper ledger shared by all workers of a run.
#[derive(Clone)]
pub struct CheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl CheckpointStore {
    /// Open or create a ledger at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Checkpoint(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Checkpoint(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory ledger (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Checkpoint(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Checkpoint(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::Checkpoint(e.to_string()))
    }

    /// Insert or replace the row for `record.paper_id`.
    pub fn save_record(&self, record: &PaperRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO papers (paper_id, status, sequence, processed_at, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.paper_id,
                    record.status.as_str(),
                    record.sequence as i64,
                    record.processed_at.to_rfc3339(),
                    payload,
                ],
            )?;
            Ok(())
        })?;
        debug!(paper_id = %record.paper_id, status = record.status.as_str(), "Checkpointed paper");
        Ok(())
    }

    /// Ids of papers that finished with a result.
    pub fn completed_ids(&self) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT paper_id FROM papers WHERE status = ?1")?;
            let ids = stmt
                .query_map(params![PaperStatus::Completed.as_str()], |row| row.get(0))?
                .collect::<rusqlite::Result<HashSet<String>>>()?;
            Ok(ids)
        })
    }

    /// Every stored record, in processing order.
    pub fn load_records(&self) -> Result<Vec<PaperRecord>> {
        let payloads = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT payload FROM papers ORDER BY sequence")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        payloads
            .iter()
            .map(|p| serde_json::from_str(p).map_err(Error::from))
            .collect()
    }

    /// The highest stamp written so far, to continue the clock from.
    pub fn last_stamp(&self) -> Result<Option<Stamp>> {
        let row = self.with_conn(|conn| {
            conn.query_row(
                "SELECT sequence, processed_at FROM papers ORDER BY sequence DESC LIMIT 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
        })?;

        row.map(|(sequence, at)| {
            let at = DateTime::parse_from_rfc3339(&at)
                .map_err(|e| Error::Checkpoint(format!("bad timestamp '{}': {}", at, e)))?
                .with_timezone(&Utc);
            Ok::<_, Error>(Stamp {
                sequence: sequence as u64,
                at,
            })
        })
        .transpose()
    }

    /// Store a progress snapshot for `run_id`.
    pub fn save_progress(&self, run_id: Uuid, snapshot: &MetricsSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO runs (run_id, started_at, updated_at, snapshot)
                 VALUES (?1, ?2, ?2, ?3)
                 ON CONFLICT(run_id) DO UPDATE SET updated_at = ?2, snapshot = ?3",
                params![run_id.to_string(), now, json],
            )?;
            Ok(())
        })
    }

    /// Latest snapshot stored for `run_id`.
    pub fn progress(&self, run_id: Uuid) -> Result<Option<MetricsSnapshot>> {
        let json = self.with_conn(|conn| {
            conn.query_row(
                "SELECT snapshot FROM runs WHERE run_id = ?1",
                params![run_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })?;
        json.map(|j| serde_json::from_str(&j).map_err(Error::from))
            .transpose()
    }

    pub fn len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
        })
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
