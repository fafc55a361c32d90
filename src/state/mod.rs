//! Operational state persistence: partition checkpoints, acquired-progress
//! markers and egress-pool health that should survive a process restart.
//!
//! Backed by a small SQLite database in the data directory. Only meaningful
//! state is kept: healthy-default pool entries are pruned on save.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::acquire::pool::EgressPool;
use crate::acquire::AcquireError;
use crate::models::EgressStatus;

/// Per-partition resume point. Stored as an opaque JSON blob; only the
/// state store and the runner interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last date fully completed.
    pub cursor_date: NaiveDate,
    /// Units of work completed in the interrupted run.
    pub completed_units: u32,
}

/// Handle to the operational state database.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn open(path: &Path) -> Result<Self, AcquireError> {
        let store = Self {
            path: path.to_path_buf(),
        };
        let conn = store.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS partition_checkpoint (
                partition TEXT PRIMARY KEY,
                blob TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS partition_progress (
                partition TEXT PRIMARY KEY,
                latest_record_date TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS egress_state (
                point_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                total_count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, AcquireError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
        "#,
        )?;
        Ok(conn)
    }

    /// Save (overwrite) a partition's checkpoint.
    pub fn save_checkpoint(
        &self,
        partition: &str,
        checkpoint: &Checkpoint,
    ) -> Result<(), AcquireError> {
        let blob = serde_json::to_string(checkpoint)
            .map_err(|e| AcquireError::Config(format!("checkpoint serialization: {e}")))?;
        let conn = self.connect()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO partition_checkpoint (partition, blob, updated_at)
               VALUES (?, ?, CURRENT_TIMESTAMP)"#,
            params![partition, blob],
        )?;
        debug!(partition, cursor = %checkpoint.cursor_date, "checkpoint saved");
        Ok(())
    }

    /// Load a partition's checkpoint, if one exists. An unreadable blob is
    /// treated as absent rather than fatal.
    pub fn load_checkpoint(&self, partition: &str) -> Result<Option<Checkpoint>, AcquireError> {
        let conn = self.connect()?;
        let blob: Option<String> = conn
            .query_row(
                "SELECT blob FROM partition_checkpoint WHERE partition = ?",
                params![partition],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.and_then(|b| serde_json::from_str(&b).ok()))
    }

    /// Drop a partition's checkpoint (run completed or operator reset).
    pub fn clear_checkpoint(&self, partition: &str) -> Result<(), AcquireError> {
        let conn = self.connect()?;
        conn.execute(
            "DELETE FROM partition_checkpoint WHERE partition = ?",
            params![partition],
        )?;
        Ok(())
    }

    /// All partitions with a live checkpoint.
    pub fn checkpointed_partitions(&self) -> Result<Vec<String>, AcquireError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT partition FROM partition_checkpoint ORDER BY partition")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut partitions = Vec::new();
        for row in rows {
            partitions.push(row?);
        }
        Ok(partitions)
    }

    /// Record the newest acquired record date for a partition, monotonically.
    pub fn advance_progress(&self, partition: &str, date: NaiveDate) -> Result<(), AcquireError> {
        if let Some(existing) = self.latest_record_date(partition)? {
            if existing >= date {
                return Ok(());
            }
        }
        let conn = self.connect()?;
        conn.execute(
            r#"INSERT OR REPLACE INTO partition_progress (partition, latest_record_date, updated_at)
               VALUES (?, ?, CURRENT_TIMESTAMP)"#,
            params![partition, date.to_string()],
        )?;
        Ok(())
    }

    /// Latest record date already acquired for a partition.
    pub fn latest_record_date(&self, partition: &str) -> Result<Option<NaiveDate>, AcquireError> {
        let conn = self.connect()?;
        let date: Option<String> = conn
            .query_row(
                "SELECT latest_record_date FROM partition_progress WHERE partition = ?",
                params![partition],
                |row| row.get(0),
            )
            .optional()?;
        Ok(date.and_then(|d| d.parse().ok()))
    }

    /// Persist pool health. Only points with non-default state are kept;
    /// entries that recovered to healthy are pruned.
    pub fn save_pool_state(&self, pool: &EgressPool) -> Result<usize, AcquireError> {
        let conn = self.connect()?;
        let mut saved = 0;
        for point in pool.points() {
            if point.status == EgressStatus::Healthy && point.total_count == 0 {
                continue;
            }
            conn.execute(
                r#"INSERT OR REPLACE INTO egress_state
                   (point_id, status, success_count, total_count, updated_at)
                   VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)"#,
                params![
                    point.id,
                    point.status.as_str(),
                    point.success_count as i64,
                    point.total_count as i64,
                ],
            )?;
            saved += 1;
        }
        conn.execute(
            "DELETE FROM egress_state WHERE status = 'healthy' AND total_count = 0",
            [],
        )?;
        if saved > 0 {
            debug!(points = saved, "pool state saved");
        }
        Ok(saved)
    }

    /// Restore persisted pool health into a freshly-built pool, matching
    /// points by id. Unknown ids are ignored (credential list changed).
    pub fn load_pool_state(&self, pool: &mut EgressPool) -> Result<usize, AcquireError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT point_id, status, success_count, total_count FROM egress_state")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)? as u64,
                row.get::<_, i64>(3)? as u64,
            ))
        })?;

        let mut restored = 0;
        for row in rows {
            let (point_id, status, success_count, total_count) = row?;
            let Some(status) = EgressStatus::from_str(&status) else {
                continue;
            };
            pool.restore_point_state(&point_id, status, success_count, total_count);
            restored += 1;
        }
        if restored > 0 {
            info!(points = restored, "restored egress pool state");
        }
        Ok(restored)
    }
}
