//! Error types for windgps.
//!
//! This module defines all error types used throughout the windgps crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for windgps operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Decode Errors ===
    /// Fewer bytes remain than one full block requires.
    #[error("truncated input: block needs {needed} bytes, only {available} available")]
    TruncatedInput {
        /// Bytes required for one block under the current geometry.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// Geometry discovery did not converge within the attempt bound.
    #[error("block layout not found after {attempts} attempts (last padding tried: {last_padding})")]
    LayoutNotFound {
        /// Number of candidate geometries tried.
        attempts: u32,
        /// Padding length of the last candidate.
        last_padding: u32,
    },

    /// A single record field failed to decode.
    #[error("failed to decode field '{field}': {message}")]
    FieldDecodeFailure {
        /// Name of the field.
        field: &'static str,
        /// Description of what went wrong.
        message: String,
    },

    // === Clock Errors ===
    /// Too few GPS anchor points to fit a clock model.
    #[error("insufficient GPS anchors for clock fit: found {found}, need at least 2")]
    InsufficientAnchors {
        /// Number of usable anchors.
        found: usize,
    },

    /// All anchors share one local tick, so no line is defined.
    #[error("degenerate GPS anchors: all {count} anchors share the same local tick")]
    DegenerateAnchors {
        /// Number of anchors involved.
        count: usize,
    },

    // === Input Errors ===
    /// The decoder was given an empty file list.
    #[error("no input files given")]
    EmptyFileSet,

    /// No input files matched the discovery filters.
    #[error("no log files matching '{pattern}' found in {dir}")]
    NoInputFiles {
        /// Directory that was searched.
        dir: PathBuf,
        /// The include substring.
        pattern: String,
    },

    /// Failed to read an input file.
    #[error("failed to read {path}: {source}")]
    FileRead {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for windgps operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a field decode failure.
    #[must_use]
    pub fn field_decode(field: &'static str, message: impl Into<String>) -> Self {
        Self::FieldDecodeFailure {
            field,
            message: message.into(),
        }
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable per record.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::FieldDecodeFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_input_display() {
        let err = Error::TruncatedInput {
            needed: 839,
            available: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("839"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_layout_not_found_display() {
        let err = Error::LayoutNotFound {
            attempts: 20,
            last_padding: 109,
        };
        assert_eq!(
            err.to_string(),
            "block layout not found after 20 attempts (last padding tried: 109)"
        );
    }

    #[test]
    fn test_insufficient_anchors_display() {
        let err = Error::InsufficientAnchors { found: 1 };
        assert!(err.to_string().contains("found 1"));
    }

    #[test]
    fn test_field_decode_failure() {
        let err = Error::field_decode("wind", "odd token count");
        assert_eq!(
            err.to_string(),
            "failed to decode field 'wind': odd token count"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(!Error::TruncatedInput {
            needed: 1,
            available: 0
        }
        .is_recoverable());
        assert!(!Error::InsufficientAnchors { found: 0 }.is_recoverable());
    }

    #[test]
    fn test_no_input_files_display() {
        let err = Error::NoInputFiles {
            dir: PathBuf::from("/data/run1"),
            pattern: ".bin".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/run1"));
        assert!(msg.contains(".bin"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::config_validation("residual_threshold must be positive");
        assert!(err.to_string().contains("residual_threshold"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_file_read_error_display() {
        let err = Error::FileRead {
            path: PathBuf::from("/data/LOG00001.bin"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("LOG00001.bin"));
    }
}
