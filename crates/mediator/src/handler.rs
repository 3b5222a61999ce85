use async_trait::async_trait;

use event_log::DomainEvent;

use crate::error::{DeliveryError, Result};
use crate::message::Message;
use crate::scope::OperationScope;

/// A collecting-phase subscriber.
///
/// Handlers run synchronously in registration order, inside the
/// publisher's call stack. A returned error propagates to the publisher
/// and aborts the surrounding unit of work, so validating handlers can
/// veto an operation.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Stable handler name used in dispatch errors and logs.
    fn name(&self) -> &'static str;

    /// Handles one published message within the given operation scope.
    async fn handle(&self, message: &Message, scope: &OperationScope) -> Result<()>;
}

/// A post-commit subscriber.
///
/// Invoked once per durable event after the unit of work has committed.
/// Failures are collected and reported as delivery failures; they never
/// roll back the commit. Retry belongs to the subscriber itself.
#[async_trait]
pub trait PostCommitHandler: Send + Sync {
    /// Stable subscriber name used in delivery failures and logs.
    fn name(&self) -> &'static str;

    /// Handles one committed event. `attempt` starts at 1 for the
    /// in-process handoff.
    async fn handle(
        &self,
        event: &DomainEvent,
        attempt: u32,
    ) -> std::result::Result<(), DeliveryError>;
}

/// Built-in subscriber that stages published events into the operation
/// scope, where the unit of work picks them up at commit.
pub struct EventStagingHandler;

#[async_trait]
impl MessageHandler for EventStagingHandler {
    fn name(&self) -> &'static str {
        "event-staging"
    }

    async fn handle(&self, message: &Message, scope: &OperationScope) -> Result<()> {
        if let Message::Event(event) = message {
            scope.stage_event(event.clone()).await?;
        }
        Ok(())
    }
}

/// Built-in subscriber that buffers published notifications into the
/// operation scope. Buffered outcomes drive the commit decision and are
/// persisted only if the unit of work commits.
pub struct NotificationBufferingHandler;

#[async_trait]
impl MessageHandler for NotificationBufferingHandler {
    fn name(&self) -> &'static str {
        "notification-buffering"
    }

    async fn handle(&self, message: &Message, scope: &OperationScope) -> Result<()> {
        if let Message::Notification(notification) = message {
            scope.buffer_notification(notification.clone()).await?;
        }
        Ok(())
    }
}
