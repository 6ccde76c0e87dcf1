//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `ResultStore`
//! and `LedgerStore` traits.

use crate::crawler::LimiterWindow;
use crate::planner::SearchUnit;
use crate::state::{PageCursor, UnitProgress, UnitStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{LedgerStore, ResultStore, StorageError, StorageResult};
use crate::storage::{BusinessRecord, RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Each committed transaction must survive a process kill
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Serialization(format!("bad timestamp '{}': {}", value, e)))
}

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Failed),
    })
}

impl ResultStore for SqliteStorage {
    fn put(&mut self, record: &BusinessRecord) -> StorageResult<bool> {
        Ok(self.put_page(std::slice::from_ref(record))? == 1)
    }

    fn put_page(&mut self, records: &[BusinessRecord]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO businesses
                 (id, name, city, state, zip_code, filter, unit_id, fetched_at, record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;

            for record in records {
                let json = serde_json::to_string(record)?;
                inserted += stmt.execute(params![
                    record.id,
                    record.name,
                    record.address.city,
                    record.address.state,
                    record.address.zip_code,
                    record.filter,
                    record.unit_id,
                    record.fetched_at.to_rfc3339(),
                    json,
                ])?;
            }
        }

        tx.commit()?;
        Ok(inserted)
    }

    fn contains(&self, id: &str) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM businesses WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM businesses", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn fetch_batch(
        &self,
        after_seq: i64,
        limit: usize,
    ) -> StorageResult<Vec<(i64, BusinessRecord)>> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, record FROM businesses WHERE seq > ?1 ORDER BY seq LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![after_seq, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, json)| -> StorageResult<(i64, BusinessRecord)> {
                Ok((seq, serde_json::from_str(&json)?))
            })
            .collect()
    }
}

impl LedgerStore for SqliteStorage {
    // ===== Unit Progress =====

    fn load_progress(&self) -> StorageResult<Vec<UnitProgress>> {
        let mut stmt = self.conn.prepare(
            "SELECT unit_id, status, next_cursor, truncated, possibly_truncated,
                    pages_fetched, records_seen, last_updated
             FROM unit_progress",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut progress = Vec::with_capacity(rows.len());
        for (unit_id, status, cursor, truncated, possibly_truncated, pages, records, updated) in rows {
            let status = UnitStatus::from_db_string(&status).ok_or_else(|| {
                StorageError::Database(format!("unit {} has unknown status '{}'", unit_id, status))
            })?;
            let next_cursor = cursor
                .map(|json| serde_json::from_str::<PageCursor>(&json))
                .transpose()?;

            progress.push(UnitProgress {
                unit_id,
                status,
                next_cursor,
                truncated,
                possibly_truncated,
                pages_fetched: pages as u32,
                records_seen: records as u64,
                last_updated: parse_timestamp(&updated)?,
            });
        }

        Ok(progress)
    }

    fn save_progress(&mut self, progress: &UnitProgress) -> StorageResult<()> {
        let cursor = progress
            .next_cursor
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO unit_progress
             (unit_id, status, next_cursor, truncated, possibly_truncated,
              pages_fetched, records_seen, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(unit_id) DO UPDATE SET
                status = excluded.status,
                next_cursor = excluded.next_cursor,
                truncated = excluded.truncated,
                possibly_truncated = excluded.possibly_truncated,
                pages_fetched = excluded.pages_fetched,
                records_seen = excluded.records_seen,
                last_updated = excluded.last_updated",
            params![
                progress.unit_id,
                progress.status.to_db_string(),
                cursor,
                progress.truncated,
                progress.possibly_truncated,
                progress.pages_fetched as i64,
                progress.records_seen as i64,
                progress.last_updated.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ===== Plans =====

    fn register_units(&mut self, root_id: &str, units: &[SearchUnit]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        tx.execute(
            "DELETE FROM planned_units WHERE root_id = ?1",
            params![root_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO planned_units (root_id, ordinal, unit_id, unit) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (ordinal, unit) in units.iter().enumerate() {
                stmt.execute(params![
                    root_id,
                    ordinal as i64,
                    unit.id(),
                    serde_json::to_string(unit)?,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn planned_units(&self, root_id: &str) -> StorageResult<Option<Vec<SearchUnit>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT unit FROM planned_units WHERE root_id = ?1 ORDER BY ordinal")?;

        let rows = stmt
            .query_map(params![root_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            return Ok(None);
        }

        let units = rows
            .iter()
            .map(|json| serde_json::from_str(json))
            .collect::<Result<Vec<SearchUnit>, _>>()?;
        Ok(Some(units))
    }

    fn planned_unit(&self, unit_id: &str) -> StorageResult<Option<SearchUnit>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT unit FROM planned_units WHERE unit_id = ?1 LIMIT 1",
                params![unit_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(json.map(|j| serde_json::from_str(&j)).transpose()?)
    }

    fn count_planned_units(&self) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT unit_id) FROM planned_units",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Rate Limiter =====

    fn load_limiter_window(&self) -> StorageResult<Option<LimiterWindow>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT window_started_at, consumed FROM limiter_window WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(started_at, consumed)| -> StorageResult<LimiterWindow> {
            Ok(LimiterWindow {
                started_at: parse_timestamp(&started_at)?,
                consumed: consumed as u32,
            })
        })
        .transpose()
    }

    fn save_limiter_window(&mut self, window: &LimiterWindow) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO limiter_window (id, window_started_at, consumed) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
                window_started_at = excluded.window_started_at,
                consumed = excluded.consumed",
            params![window.started_at.to_rfc3339(), window.consumed as i64],
        )?;
        Ok(())
    }

    // ===== Run Management =====

    fn begin_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;

        Ok(run)
    }
}
