//! `SQLite` schema definitions for windgps.
//!
//! This module contains the SQL statements for creating and managing
//! the database schema.

/// SQL statement to create the runs table.
pub const CREATE_RUNS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT,
    source_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    file_count INTEGER NOT NULL,
    records_per_block INTEGER NOT NULL,
    padding_bytes INTEGER NOT NULL,
    slope REAL NOT NULL,
    intercept REAL NOT NULL,
    anchor_count INTEGER NOT NULL,
    inlier_count INTEGER NOT NULL,
    row_count INTEGER NOT NULL,
    wind_keys TEXT NOT NULL
)
";

/// SQL statement to create the samples table.
///
/// Latitude and longitude are nullable because `SQLite` stores NaN as NULL.
pub const CREATE_SAMPLES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS samples (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    seq INTEGER NOT NULL,
    local_millis INTEGER NOT NULL,
    latitude REAL,
    longitude REAL,
    epoch_seconds REAL NOT NULL,
    wind TEXT NOT NULL,
    PRIMARY KEY (run_id, seq)
)
";

/// SQL statement to create an index on `created_at` for listing runs.
pub const CREATE_CREATED_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at DESC)
";

/// SQL statement to create an index on `epoch_seconds` for time queries.
pub const CREATE_EPOCH_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_samples_epoch ON samples(epoch_seconds)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_RUNS_TABLE,
    CREATE_SAMPLES_TABLE,
    CREATE_CREATED_INDEX,
    CREATE_EPOCH_INDEX,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_runs_table_dedups_on_source_hash() {
        assert!(CREATE_RUNS_TABLE.contains("source_hash TEXT NOT NULL UNIQUE"));
        assert!(CREATE_RUNS_TABLE.contains("wind_keys TEXT NOT NULL"));
    }

    #[test]
    fn test_samples_table_keyed_by_run_and_seq() {
        assert!(CREATE_SAMPLES_TABLE.contains("PRIMARY KEY (run_id, seq)"));
        assert!(CREATE_SAMPLES_TABLE.contains("epoch_seconds REAL NOT NULL"));
    }
}
