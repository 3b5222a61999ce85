use thiserror::Error;

/// Errors that can occur when interacting with the notification recorder.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The session was used out of order (e.g. commit before prepare).
    #[error("invalid session use: {0}")]
    Session(&'static str),

    /// A storage error occurred.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for notification recorder operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
