use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{NotificationError, Result};
use crate::notification::DomainNotification;
use crate::recorder::{NotificationRecorder, NotificationSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Staging,
    Prepared,
    Finished,
}

#[derive(Debug, Default)]
struct RecorderInner {
    /// Recorded notifications in insertion (commit) order.
    recorded: Vec<DomainNotification>,

    /// Fault injection: fail the next session commit with a storage error.
    fail_next_commit: bool,
}

/// In-memory notification recorder for testing and embedding defaults.
#[derive(Clone, Default)]
pub struct InMemoryNotificationRecorder {
    inner: Arc<RwLock<RecorderInner>>,
}

impl InMemoryNotificationRecorder {
    /// Creates a new empty in-memory recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of recorded notifications.
    pub fn notification_count(&self) -> usize {
        self.inner.read().unwrap().recorded.len()
    }

    /// Clears all recorded notifications.
    pub fn clear(&self) {
        self.inner.write().unwrap().recorded.clear();
    }

    /// Configures the recorder to fail the next session commit.
    pub fn set_fail_next_commit(&self, fail: bool) {
        self.inner.write().unwrap().fail_next_commit = fail;
    }
}

#[async_trait]
impl NotificationRecorder for InMemoryNotificationRecorder {
    async fn begin_session(&self) -> Result<Box<dyn NotificationSession>> {
        Ok(Box::new(InMemoryNotificationSession {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            phase: Phase::Staging,
        }))
    }

    async fn query_by_key(&self, domain: &str, key: &str) -> Result<Vec<DomainNotification>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .recorded
            .iter()
            .filter(|n| n.domain == domain && n.key == key)
            .cloned()
            .collect())
    }
}

/// Write session against an [`InMemoryNotificationRecorder`].
pub struct InMemoryNotificationSession {
    inner: Arc<RwLock<RecorderInner>>,
    staged: Vec<DomainNotification>,
    phase: Phase,
}

#[async_trait]
impl NotificationSession for InMemoryNotificationSession {
    fn stage(&mut self, notification: DomainNotification) -> Result<()> {
        if self.phase != Phase::Staging {
            return Err(NotificationError::Session(
                "stage requires a staging session",
            ));
        }
        self.staged.push(notification);
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        if self.phase != Phase::Staging {
            return Err(NotificationError::Session(
                "prepare requires a staging session",
            ));
        }
        self.phase = Phase::Prepared;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.phase != Phase::Prepared {
            return Err(NotificationError::Session(
                "commit requires a prepared session",
            ));
        }

        let mut inner = self.inner.write().unwrap();

        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            self.phase = Phase::Finished;
            return Err(NotificationError::Storage("injected commit failure".into()));
        }

        let count = self.staged.len();
        inner.recorded.append(&mut self.staged);
        self.phase = Phase::Finished;
        metrics::counter!("notifications_recorded_total").increment(count as u64);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.phase = Phase::Finished;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn record(recorder: &InMemoryNotificationRecorder, notifications: Vec<DomainNotification>) {
        let mut session = recorder.begin_session().await.unwrap();
        for notification in notifications {
            session.stage(notification).unwrap();
        }
        session.prepare().await.unwrap();
        session.commit().await.unwrap();
    }

    #[tokio::test]
    async fn recorded_notifications_are_queryable_oldest_first() {
        let recorder = InMemoryNotificationRecorder::new();
        record(
            &recorder,
            vec![
                DomainNotification::info("user", "u-1", "created"),
                DomainNotification::warning("user", "u-1", "weak password"),
                DomainNotification::info("user", "u-2", "created"),
            ],
        )
        .await;

        let results = recorder.query_by_key("user", "u-1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].message, "created");
        assert_eq!(results[1].message, "weak password");
    }

    #[tokio::test]
    async fn query_for_unknown_key_is_empty() {
        let recorder = InMemoryNotificationRecorder::new();
        let results = recorder.query_by_key("user", "missing").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn rollback_discards_staged_notifications() {
        let recorder = InMemoryNotificationRecorder::new();
        let mut session = recorder.begin_session().await.unwrap();
        session
            .stage(DomainNotification::info("user", "u-1", "created"))
            .unwrap();
        session.prepare().await.unwrap();
        session.rollback().await.unwrap();

        assert_eq!(recorder.notification_count(), 0);
    }

    #[tokio::test]
    async fn commit_requires_prepare() {
        let recorder = InMemoryNotificationRecorder::new();
        let mut session = recorder.begin_session().await.unwrap();
        session
            .stage(DomainNotification::info("user", "u-1", "created"))
            .unwrap();
        let result = session.commit().await;
        assert!(matches!(result, Err(NotificationError::Session(_))));
    }

    #[tokio::test]
    async fn injected_commit_failure_is_one_shot() {
        let recorder = InMemoryNotificationRecorder::new();
        recorder.set_fail_next_commit(true);

        let mut session = recorder.begin_session().await.unwrap();
        session
            .stage(DomainNotification::info("user", "u-1", "created"))
            .unwrap();
        session.prepare().await.unwrap();
        let result = session.commit().await;
        assert!(matches!(result, Err(NotificationError::Storage(_))));
        assert_eq!(recorder.notification_count(), 0);

        record(
            &recorder,
            vec![DomainNotification::info("user", "u-1", "created")],
        )
        .await;
        assert_eq!(recorder.notification_count(), 1);
    }
}
