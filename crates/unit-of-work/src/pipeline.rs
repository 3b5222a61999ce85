use std::sync::Arc;

use event_log::{EventLog, InMemoryEventLog};
use mediator::{
    EventStagingHandler, Mediator, MessageHandler, MessageKind, NotificationBufferingHandler,
    OperationScope, PostCommitHandler,
};
use notifications::{InMemoryNotificationRecorder, NotificationRecorder};

use crate::config::PipelineConfig;
use crate::relay::{OutboundRelay, RelaySubscriber};
use crate::store::{AggregateStateStore, InMemoryStateStore};
use crate::uow::UnitOfWork;

/// Assembled pipeline: the mediator registry plus the three stores.
///
/// Built once at startup; `begin` hands out one [`UnitOfWork`] per
/// business operation. The read surfaces of the stores remain reachable
/// through the accessors for query-side callers.
pub struct Pipeline {
    mediator: Arc<Mediator>,
    event_log: Arc<dyn EventLog>,
    recorder: Arc<dyn NotificationRecorder>,
    state_store: Arc<dyn AggregateStateStore>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Starts a unit of work for one business operation.
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork::new(
            Arc::clone(&self.mediator),
            OperationScope::with_limit(self.config.max_staged_events),
            Arc::clone(&self.event_log),
            Arc::clone(&self.recorder),
            Arc::clone(&self.state_store),
        )
    }

    /// Returns the event log for query-side callers.
    pub fn event_log(&self) -> Arc<dyn EventLog> {
        Arc::clone(&self.event_log)
    }

    /// Returns the notification recorder for query-side callers.
    pub fn notifications(&self) -> Arc<dyn NotificationRecorder> {
        Arc::clone(&self.recorder)
    }

    /// Returns the aggregate-state store.
    pub fn state_store(&self) -> Arc<dyn AggregateStateStore> {
        Arc::clone(&self.state_store)
    }
}

/// Builder wiring stores, handlers, and post-commit subscribers into a
/// [`Pipeline`].
///
/// The built-in staging and buffering handlers are registered first, so
/// every published event and notification reaches the operation scope;
/// additional handlers run after them in registration order. Stores
/// default to the in-memory implementations.
#[derive(Default)]
pub struct PipelineBuilder {
    event_log: Option<Arc<dyn EventLog>>,
    recorder: Option<Arc<dyn NotificationRecorder>>,
    state_store: Option<Arc<dyn AggregateStateStore>>,
    handlers: Vec<(MessageKind, Arc<dyn MessageHandler>)>,
    post_commit: Vec<Arc<dyn PostCommitHandler>>,
    config: Option<PipelineConfig>,
}

impl PipelineBuilder {
    /// Sets the event log.
    pub fn event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Sets the notification recorder.
    pub fn notification_recorder(mut self, recorder: Arc<dyn NotificationRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Sets the aggregate-state store.
    pub fn state_store(mut self, state_store: Arc<dyn AggregateStateStore>) -> Self {
        self.state_store = Some(state_store);
        self
    }

    /// Sets the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers an additional collecting-phase handler.
    pub fn subscribe(mut self, kind: MessageKind, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push((kind, handler));
        self
    }

    /// Registers a post-commit subscriber.
    pub fn subscribe_post_commit(mut self, subscriber: Arc<dyn PostCommitHandler>) -> Self {
        self.post_commit.push(subscriber);
        self
    }

    /// Registers an outbound relay as a post-commit subscriber.
    pub fn relay<R: OutboundRelay + 'static>(self, relay: R) -> Self {
        self.subscribe_post_commit(Arc::new(RelaySubscriber::new(relay)))
    }

    /// Builds the pipeline, freezing the handler registry.
    pub fn build(self) -> Pipeline {
        let mut mediator = Mediator::builder()
            .subscribe(MessageKind::Event, Arc::new(EventStagingHandler))
            .subscribe(MessageKind::Notification, Arc::new(NotificationBufferingHandler));

        for (kind, handler) in self.handlers {
            mediator = mediator.subscribe(kind, handler);
        }
        for subscriber in self.post_commit {
            mediator = mediator.subscribe_post_commit(subscriber);
        }

        Pipeline {
            mediator: Arc::new(mediator.build()),
            event_log: self
                .event_log
                .unwrap_or_else(|| Arc::new(InMemoryEventLog::new())),
            recorder: self
                .recorder
                .unwrap_or_else(|| Arc::new(InMemoryNotificationRecorder::new())),
            state_store: self
                .state_store
                .unwrap_or_else(|| Arc::new(InMemoryStateStore::new())),
            config: self.config.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::InMemoryRelay;

    #[test]
    fn defaults_to_in_memory_stores() {
        let pipeline = Pipeline::builder().build();
        let uow = pipeline.begin();
        assert_eq!(uow.state(), crate::uow::UowState::Open);
    }

    #[test]
    fn relay_registration_reaches_the_mediator() {
        let pipeline = Pipeline::builder().relay(InMemoryRelay::new()).build();
        assert_eq!(pipeline.mediator.post_commit_count(), 1);
        // Built-in staging handlers are always present.
        assert_eq!(pipeline.mediator.handler_count(MessageKind::Event), 1);
        assert_eq!(pipeline.mediator.handler_count(MessageKind::Notification), 1);
    }
}
