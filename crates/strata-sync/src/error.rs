//! Sync engine error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad or inconsistent configuration.
    #[error("Sync configuration error: {0}")]
    Config(String),

    /// Local database failure while reading or acking the queue.
    #[error("Database error: {0}")]
    Db(#[from] strata_db::DbError),

    /// The transport could not deliver the batch at all (network down,
    /// upstream unreachable). Entries stay pending.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Payload (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
