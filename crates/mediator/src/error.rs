use thiserror::Error;

use event_log::EventId;

use crate::message::MessageKind;

/// Errors raised while dispatching a message during the collecting phase.
///
/// A dispatch error is a veto: it propagates to the publisher and aborts
/// the surrounding unit of work.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A subscribed handler failed.
    #[error("handler {handler} failed for {kind} message: {reason}")]
    Handler {
        handler: &'static str,
        kind: MessageKind,
        reason: String,
    },

    /// The operation's buffer limit was reached.
    #[error("operation buffer full: limit of {limit} staged {kind} messages reached")]
    BufferFull { kind: MessageKind, limit: usize },
}

impl DispatchError {
    /// Creates a handler failure from any error-like reason.
    pub fn handler(
        handler: &'static str,
        kind: MessageKind,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Handler {
            handler,
            kind,
            reason: reason.to_string(),
        }
    }
}

/// Error returned by a post-commit subscriber for a single delivery.
#[derive(Debug, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

impl DeliveryError {
    /// Creates a delivery error from any error-like reason.
    pub fn new(reason: impl std::fmt::Display) -> Self {
        Self(reason.to_string())
    }
}

/// A failed post-commit delivery, reported to the caller for external
/// retry. Never rolls back the committed unit of work.
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    /// The post-commit subscriber that failed.
    pub subscriber: &'static str,

    /// The event that could not be delivered.
    pub event_id: EventId,

    /// Which delivery attempt this was.
    pub attempt: u32,

    /// Why the delivery failed.
    pub reason: String,
}

/// Result type for collecting-phase dispatch.
pub type Result<T> = std::result::Result<T, DispatchError>;
