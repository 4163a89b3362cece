//! Storage layer for windgps.
//!
//! This module provides `SQLite`-based persistent storage for processed runs,
//! deduplicated on the hash of their input files.

pub mod migrations;
pub mod schema;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::codec::BlockGeometry;
use crate::error::{Error, Result};
use crate::pipeline::Dataset;

/// Columns selected for a [`RunRecord`], in `row_to_run` order.
const RUN_COLUMNS: &str = "id, label, source_hash, created_at, file_count, records_per_block, \
     padding_bytes, slope, intercept, anchor_count, inlier_count, row_count, wind_keys";

/// Storage engine for processed runs.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// A stored run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRecord {
    /// Row id.
    pub id: i64,
    /// Run label.
    pub label: Option<String>,
    /// Hash of the input files in order.
    pub source_hash: String,
    /// When the run was stored.
    pub created_at: DateTime<Utc>,
    /// Files processed.
    pub file_count: usize,
    /// Block geometry used.
    pub geometry: BlockGeometry,
    /// Clock slope.
    pub slope: f64,
    /// Clock intercept.
    pub intercept: f64,
    /// GPS anchors found.
    pub anchor_count: usize,
    /// Anchors kept as inliers.
    pub inlier_count: usize,
    /// Samples stored.
    pub row_count: usize,
    /// Wind keys, in column order.
    pub wind_keys: Vec<String>,
}

/// A stored sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSample {
    /// Position in the run.
    pub seq: usize,
    /// Repaired local millisecond counter.
    pub local_millis: u32,
    /// Latitude, NaN if the logger wrote NaN.
    pub latitude: f32,
    /// Longitude, NaN if the logger wrote NaN.
    pub longitude: f32,
    /// UTC epoch seconds.
    pub epoch_seconds: f64,
    /// Wind value per key, `None` when missing.
    pub wind: BTreeMap<String, Option<f64>>,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a dataset as one run.
    ///
    /// The run and its samples are written in one transaction. Returns the
    /// run id, or `None` if a run with the same source hash already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_run(&mut self, dataset: &Dataset) -> Result<Option<i64>> {
        if self.exists_by_hash(&dataset.source_hash)? {
            debug!(
                "Skipping duplicate run with source hash {}",
                short_hash(&dataset.source_hash)
            );
            return Ok(None);
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            r"
            INSERT INTO runs (label, source_hash, created_at, file_count, records_per_block,
                              padding_bytes, slope, intercept, anchor_count, inlier_count,
                              row_count, wind_keys)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
            params![
                dataset.label,
                dataset.source_hash,
                Utc::now().to_rfc3339(),
                to_i64(dataset.files.len()),
                dataset.geometry.records_per_block,
                dataset.geometry.padding_bytes,
                dataset.clock.model.slope,
                dataset.clock.model.intercept,
                to_i64(dataset.clock.anchor_count),
                to_i64(dataset.clock.inliers.len()),
                to_i64(dataset.rows.len()),
                serde_json::to_string(&dataset.wind_keys)?,
            ],
        )?;
        let run_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO samples (run_id, seq, local_millis, latitude, longitude,
                                     epoch_seconds, wind)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;
            for (seq, row) in dataset.rows.iter().enumerate() {
                let wind: BTreeMap<&str, Option<f64>> = dataset
                    .wind_keys
                    .iter()
                    .map(String::as_str)
                    .zip(row.wind.iter().copied())
                    .collect();
                stmt.execute(params![
                    run_id,
                    to_i64(seq),
                    row.local_millis,
                    f64::from(row.latitude),
                    f64::from(row.longitude),
                    row.epoch_seconds,
                    serde_json::to_string(&wind)?,
                ])?;
            }
        }
        tx.commit()?;

        info!(
            run_id,
            samples = dataset.rows.len(),
            "Stored run {}",
            dataset.label.as_deref().unwrap_or("(unlabelled)")
        );
        Ok(Some(run_id))
    }

    /// Check if a run with the given source hash already exists.
    fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE source_hash = ?1",
            [hash],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get a run by its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get_run(&self, id: i64) -> Result<Option<RunRecord>> {
        let result = self
            .conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                [id],
                Self::row_to_run,
            )
            .optional()?;
        Ok(result)
    }

    /// Get the most recently stored runs, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT ?1"
        ))?;

        let runs = stmt
            .query_map([to_i64(limit)], Self::row_to_run)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    /// Get the samples of a run in capture order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn samples_for_run(&self, run_id: i64) -> Result<Vec<StoredSample>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT seq, local_millis, latitude, longitude, epoch_seconds, wind
            FROM samples WHERE run_id = ?1 ORDER BY seq
            ",
        )?;

        let rows = stmt
            .query_map([run_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, local_millis, lat, lon, epoch_seconds, wind)| {
                Ok(StoredSample {
                    seq: to_usize(seq),
                    local_millis,
                    latitude: to_f32(lat),
                    longitude: to_f32(lon),
                    epoch_seconds,
                    wind: serde_json::from_str(&wind)?,
                })
            })
            .collect()
    }

    /// Count stored runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count_runs(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete a run and its samples.
    ///
    /// Returns `true` if a run was deleted, `false` if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn delete_run(&mut self, id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM samples WHERE run_id = ?1", [id])?;
        let affected = tx.execute("DELETE FROM runs WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    /// Convert a database row to a `RunRecord`.
    fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        let created_str: String = row.get(3)?;
        let keys_str: String = row.get(12)?;

        let created_at = DateTime::parse_from_rfc3339(&created_str)
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |dt| dt.with_timezone(&Utc));

        let wind_keys = serde_json::from_str(&keys_str).unwrap_or_else(|e| {
            warn!("Unreadable wind keys {keys_str:?}: {e}");
            Vec::new()
        });

        Ok(RunRecord {
            id: row.get(0)?,
            label: row.get(1)?,
            source_hash: row.get(2)?,
            created_at,
            file_count: to_usize(row.get(4)?),
            geometry: BlockGeometry::new(row.get(5)?, row.get(6)?),
            slope: row.get(7)?,
            intercept: row.get(8)?,
            anchor_count: to_usize(row.get(9)?),
            inlier_count: to_usize(row.get(10)?),
            row_count: to_usize(row.get(11)?),
            wind_keys,
        })
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_usize(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

#[allow(clippy::cast_possible_truncation)]
fn to_f32(v: Option<f64>) -> f32 {
    v.map_or(f32::NAN, |v| v as f32)
}

fn short_hash(hash: &str) -> &str {
    hash.get(..16).unwrap_or(hash)
}
