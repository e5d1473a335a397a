//! Error taxonomy shared across the ingestion and maintenance boundaries.
//!
//! Components that need to pattern-match on failure class (the ingestor deciding whether to
//! reconnect vs. drop-and-continue, the scheduler deciding whether to retry a job) use these
//! enums directly. Everything else converts into `anyhow::Error` at the call site.

use thiserror::Error;

/// Errors surfaced while pulling a single frame through decompression, parsing, the version
/// gate and dispatch (C6/C5 boundary).
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("frame decompression failed: {0}")]
    Decompress(String),

    #[error("frame decompression exceeded the wall-clock deadline")]
    DecompressTimeout,

    #[error("frame body is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("schema {0} is not recognized")]
    SchemaOutOfScope(String),

    #[error("game version {0} rejected by the version gate")]
    VersionRejected(String),

    #[error("database busy beyond timeout while writing schema {schema}")]
    WriteContention { schema: String },

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

/// Errors surfaced from the maintenance window: backup, vacuum, retention, snapshot refresh.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("backup aborted, insufficient disk space for {db}")]
    BackupDiskSpace { db: String },

    #[error("backup verification failed for {db}: {reason}")]
    BackupVerification { db: String, reason: String },

    #[error("snapshot refresh failed: {0}")]
    SnapshotRefresh(String),

    #[error("retention sweep failed on {store}: {source}")]
    RetentionSweep {
        store: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("integrity check failed for {db}: {reason}")]
    IntegrityCheck { db: String, reason: String },

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
