use tokio::sync::RwLock;

use event_log::DomainEvent;
use notifications::DomainNotification;

use crate::error::{DispatchError, Result};
use crate::message::MessageKind;

/// Default cap on staged messages per buffer.
pub const DEFAULT_MAX_STAGED: usize = 1024;

/// Per-operation buffers for one unit of work.
///
/// Exactly one unit of work owns a scope; it is never shared across
/// operations. The process-wide staging handlers write into whichever
/// scope the current publish call carries, which keeps the mediator itself
/// free of operation state.
pub struct OperationScope {
    events: RwLock<Vec<DomainEvent>>,
    notifications: RwLock<Vec<DomainNotification>>,
    max_staged: usize,
}

impl OperationScope {
    /// Creates a scope with the default buffer limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_STAGED)
    }

    /// Creates a scope capping each buffer at `max_staged` entries.
    pub fn with_limit(max_staged: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            notifications: RwLock::new(Vec::new()),
            max_staged,
        }
    }

    /// Appends an event to the staged buffer.
    pub async fn stage_event(&self, event: DomainEvent) -> Result<()> {
        let mut events = self.events.write().await;
        if events.len() >= self.max_staged {
            return Err(DispatchError::BufferFull {
                kind: MessageKind::Event,
                limit: self.max_staged,
            });
        }
        events.push(event);
        Ok(())
    }

    /// Appends a notification to the buffered outcomes.
    pub async fn buffer_notification(&self, notification: DomainNotification) -> Result<()> {
        let mut notifications = self.notifications.write().await;
        if notifications.len() >= self.max_staged {
            return Err(DispatchError::BufferFull {
                kind: MessageKind::Notification,
                limit: self.max_staged,
            });
        }
        notifications.push(notification);
        Ok(())
    }

    /// Returns a copy of the staged events, in publish order.
    pub async fn staged_events(&self) -> Vec<DomainEvent> {
        self.events.read().await.clone()
    }

    /// Returns a copy of the buffered notifications, in publish order.
    pub async fn buffered_notifications(&self) -> Vec<DomainNotification> {
        self.notifications.read().await.clone()
    }

    /// Returns true if any buffered notification blocks the commit.
    pub async fn has_blocking_notification(&self) -> bool {
        self.notifications.read().await.iter().any(|n| n.is_blocking())
    }

    /// Returns the number of staged events.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns the number of buffered notifications.
    pub async fn notification_count(&self) -> usize {
        self.notifications.read().await.len()
    }
}

impl Default for OperationScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_log::{AggregateId, Version};

    fn make_event(version: i64) -> DomainEvent {
        DomainEvent::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("User")
            .event_type("UserCreated")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
    }

    #[tokio::test]
    async fn buffers_preserve_publish_order() {
        let scope = OperationScope::new();
        scope.stage_event(make_event(1)).await.unwrap();
        scope.stage_event(make_event(2)).await.unwrap();

        let events = scope.staged_events().await;
        assert_eq!(events[0].version, Version::new(1));
        assert_eq!(events[1].version, Version::new(2));
    }

    #[tokio::test]
    async fn blocking_detection_requires_error_severity() {
        let scope = OperationScope::new();
        scope
            .buffer_notification(DomainNotification::warning("user", "u-1", "slow"))
            .await
            .unwrap();
        assert!(!scope.has_blocking_notification().await);

        scope
            .buffer_notification(DomainNotification::error("user", "u-1", "invalid"))
            .await
            .unwrap();
        assert!(scope.has_blocking_notification().await);
    }

    #[tokio::test]
    async fn event_buffer_limit_is_enforced() {
        let scope = OperationScope::with_limit(2);
        scope.stage_event(make_event(1)).await.unwrap();
        scope.stage_event(make_event(2)).await.unwrap();

        let result = scope.stage_event(make_event(3)).await;
        assert!(matches!(
            result,
            Err(DispatchError::BufferFull { limit: 2, .. })
        ));
    }
}
