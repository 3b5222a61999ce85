use thiserror::Error;

use event_log::{AggregateId, Version};
use mediator::DispatchError;
use notifications::DomainNotification;

use crate::uow::UowState;

/// The three stores participating in a unit of work's atomic group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The aggregate-state store.
    AggregateState,

    /// The append-only event log.
    EventLog,

    /// The notification recorder.
    Notifications,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::AggregateState => write!(f, "aggregate-state"),
            StoreKind::EventLog => write!(f, "event-log"),
            StoreKind::Notifications => write!(f, "notifications"),
        }
    }
}

/// A unit of work aborted because a blocking notification was raised.
///
/// Carries every notification buffered during the operation so the caller
/// can report the rejection; none of them were persisted.
#[derive(Debug, Clone)]
pub struct ValidationFailure {
    /// All notifications buffered by the aborted unit of work.
    pub notifications: Vec<DomainNotification>,
}

impl ValidationFailure {
    /// Returns only the blocking (error-severity) notifications.
    pub fn blocking(&self) -> impl Iterator<Item = &DomainNotification> {
        self.notifications.iter().filter(|n| n.is_blocking())
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let blocking: Vec<&str> = self.blocking().map(|n| n.message.as_str()).collect();
        write!(
            f,
            "{} blocking notification(s): {}",
            blocking.len(),
            blocking.join("; ")
        )
    }
}

/// One or more stores committed while a later commit step failed.
///
/// This is a detectable, not automatically healable, inconsistency: it
/// must reach an operator or monitoring path and is never retried by the
/// pipeline, since retrying could double-apply an already-committed store.
#[derive(Debug, Clone, Error)]
#[error("partial commit: {failed} failed after {committed:?} committed: {reason}")]
pub struct PartialCommitError {
    /// Stores whose commit succeeded, in commit order.
    pub committed: Vec<StoreKind>,

    /// The store whose commit failed.
    pub failed: StoreKind,

    /// The underlying failure.
    pub reason: String,
}

/// Errors that can occur when interacting with the aggregate-state store.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// The session was used out of order (e.g. commit before prepare).
    #[error("invalid session use: {0}")]
    Session(&'static str),

    /// A storage error occurred.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors that can terminate a unit of work.
///
/// Every variant except `PartialCommit` resolves to "operation failed,
/// caller may retry from scratch"; a partial commit must be escalated.
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// A blocking notification aborted the operation before any store was
    /// touched.
    #[error("operation rejected: {0}")]
    Validation(ValidationFailure),

    /// Optimistic concurrency loss: another operation committed this
    /// aggregate version first. Retry the whole operation from scratch.
    #[error("version conflict on aggregate {aggregate_id} at version {version}")]
    VersionConflict {
        aggregate_id: AggregateId,
        version: Version,
    },

    /// A collecting-phase handler failed; aborts exactly like a validation
    /// failure.
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    /// The atomic group broke apart mid-commit; operator attention needed.
    #[error(transparent)]
    PartialCommit(#[from] PartialCommitError),

    /// Transient storage failure before anything committed; safe to retry
    /// the operation.
    #[error("storage failure in {store}: {reason}")]
    Storage { store: StoreKind, reason: String },

    /// The unit of work was driven through an invalid lifecycle
    /// transition.
    #[error("unit of work is {actual}, expected {expected}")]
    State { expected: UowState, actual: UowState },
}

/// Result type for unit of work operations.
pub type Result<T> = std::result::Result<T, UnitOfWorkError>;
