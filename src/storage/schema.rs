//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Biz-Sweep database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track sweep runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Write-once business records; seq gives insertion order for export
CREATE TABLE IF NOT EXISTS businesses (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    city TEXT,
    state TEXT,
    zip_code TEXT,
    filter TEXT,
    unit_id TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    record TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_businesses_unit ON businesses(unit_id);
CREATE INDEX IF NOT EXISTS idx_businesses_zip ON businesses(zip_code);

-- Units planned for each root, in crawl order
CREATE TABLE IF NOT EXISTS planned_units (
    root_id TEXT NOT NULL,
    ordinal INTEGER NOT NULL,
    unit_id TEXT NOT NULL,
    unit TEXT NOT NULL,
    PRIMARY KEY (root_id, ordinal)
);

CREATE INDEX IF NOT EXISTS idx_planned_units_unit ON planned_units(unit_id);

-- Crawl ledger: one row per started unit
CREATE TABLE IF NOT EXISTS unit_progress (
    unit_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    next_cursor TEXT,
    truncated INTEGER NOT NULL DEFAULT 0,
    possibly_truncated INTEGER NOT NULL DEFAULT 0,
    pages_fetched INTEGER NOT NULL DEFAULT 0,
    records_seen INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_unit_progress_status ON unit_progress(status);

-- Request budget window, carried across restarts
CREATE TABLE IF NOT EXISTS limiter_window (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    window_started_at TEXT NOT NULL,
    consumed INTEGER NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
