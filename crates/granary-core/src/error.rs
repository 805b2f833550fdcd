//! Error types for granary-core
//!
//! Internal failures are recovered locally: the store degrades to serving the
//! last published state. Absence (unknown id, empty result) is never an error
//! here; it is modelled as an outcome variant in `query` and `analytics`.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for granary operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // IO Errors
    // ===================
    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file: {path}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to create directory: {path}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ===================
    // Parse Errors
    // ===================
    #[error("Failed to parse JSON in {path}: {message}")]
    JsonParse {
        path: PathBuf,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The cache decoded as JSON but its structure cannot be interpreted
    #[error("Unrecognized cache structure: {message}")]
    CacheFormat { message: String },

    #[error("Failed to serialize {what}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    // ===================
    // Backup Errors
    // ===================
    #[error("Backup file is corrupt: {path}: {message}")]
    BackupCorrupt { path: PathBuf, message: String },

    #[error("Backup at {path} is unreadable and no snapshot or source cache can replace it")]
    BackupUnrecoverable { path: PathBuf },

    #[error("Failed to write snapshot {path}: {message}")]
    SnapshotWrite { path: PathBuf, message: String },
}

impl CoreError {
    /// Map an io::Error for `path`, distinguishing a missing file
    pub fn from_read(path: &std::path::Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CoreError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    }
}

/// A single cache entry that could not be interpreted and was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialRecordError {
    /// Collection the entry came from (`documents`, `transcripts`, `documentPanels`)
    pub section: &'static str,
    /// Key of the entry inside that collection
    pub key: String,
    pub message: String,
}

impl std::fmt::Display for PartialRecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.section, self.key, self.message)
    }
}

/// Report of entry-level problems encountered while parsing one cache read
///
/// Parsing never fails on a single bad entry; it is skipped and recorded here.
#[derive(Debug, Default, Clone)]
pub struct ParseReport {
    pub warnings: Vec<PartialRecordError>,
    pub entries_seen: usize,
    pub entries_skipped: usize,
}

impl ParseReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_entry(&mut self) {
        self.entries_seen += 1;
    }

    pub fn skip(
        &mut self,
        section: &'static str,
        key: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.entries_skipped += 1;
        self.warnings.push(PartialRecordError {
            section,
            key: key.into(),
            message: message.into(),
        });
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Freshness of the published state relative to the source cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradedState {
    /// Last reload attempt succeeded (or nothing needed reloading)
    Healthy,
    /// The last reload failed; queries are served from the previous state
    Stale { reason: String },
}

impl DegradedState {
    pub fn is_healthy(&self) -> bool {
        matches!(self, DegradedState::Healthy)
    }

    pub fn is_degraded(&self) -> bool {
        !self.is_healthy()
    }
}
