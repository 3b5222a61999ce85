use thiserror::Error;

use crate::event::Version;
use crate::ids::AggregateId;

/// Errors that can occur when interacting with the event log.
#[derive(Debug, Error)]
pub enum EventLogError {
    /// Optimistic concurrency loss: the staged version is already taken,
    /// either by a committed event or by another prepared session.
    #[error(
        "version conflict for aggregate {aggregate_id}: staged version {version} but current committed version is {current}"
    )]
    VersionConflict {
        aggregate_id: AggregateId,
        version: Version,
        current: Version,
    },

    /// The staged batch is malformed (non-contiguous versions within an
    /// aggregate).
    #[error("invalid staged batch: {0}")]
    InvalidBatch(String),

    /// The session was used out of order (e.g. commit before prepare).
    #[error("invalid session use: {0}")]
    Session(&'static str),

    /// A storage error occurred.
    #[error("storage error: {0}")]
    Storage(String),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;
