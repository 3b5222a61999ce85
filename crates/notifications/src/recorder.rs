use async_trait::async_trait;

use crate::error::Result;
use crate::notification::DomainNotification;

/// Core trait for notification recorder implementations.
///
/// Writes go through the same two-phase session discipline as the event
/// log, so a surrounding unit of work can commit notifications atomically
/// with the other stores. Recording happens only inside a committing unit
/// of work, after the commit decision is made.
#[async_trait]
pub trait NotificationRecorder: Send + Sync {
    /// Opens a write session against the recorder.
    async fn begin_session(&self) -> Result<Box<dyn NotificationSession>>;

    /// Returns the recorded notifications for a domain/key pair, oldest
    /// first. Read-only and safe for concurrent use.
    async fn query_by_key(&self, domain: &str, key: &str) -> Result<Vec<DomainNotification>>;
}

/// One write session in the recorder's two-phase commit discipline.
///
/// Lifecycle: `stage` any number of notifications, `prepare` exactly once,
/// then `commit` or `rollback` exactly once.
#[async_trait]
pub trait NotificationSession: Send {
    /// Stages a notification for this session. Nothing is durable until
    /// `commit`.
    fn stage(&mut self, notification: DomainNotification) -> Result<()>;

    /// Validates the session and readies the staged notifications.
    async fn prepare(&mut self) -> Result<()>;

    /// Makes the prepared notifications durable.
    async fn commit(&mut self) -> Result<()>;

    /// Releases the session; staged notifications are discarded.
    async fn rollback(&mut self) -> Result<()>;
}
