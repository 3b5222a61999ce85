use std::collections::HashMap;
use std::sync::Arc;

use event_log::DomainEvent;

use crate::error::{DeliveryFailure, Result};
use crate::handler::{MessageHandler, PostCommitHandler};
use crate::message::{Message, MessageKind};
use crate::scope::OperationScope;

/// In-process synchronous publish/subscribe dispatcher.
///
/// The registry maps a message kind to an ordered list of handlers,
/// resolved once at startup by [`MediatorBuilder`] and read-only
/// thereafter. Dispatch runs in the caller's task: no queue, no
/// cross-thread handoff, no retry at this layer.
pub struct Mediator {
    collecting: HashMap<MessageKind, Vec<Arc<dyn MessageHandler>>>,
    post_commit: Vec<Arc<dyn PostCommitHandler>>,
}

impl Mediator {
    /// Creates a new mediator builder.
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::default()
    }

    /// Returns the number of handlers registered for a kind.
    pub fn handler_count(&self, kind: MessageKind) -> usize {
        self.collecting.get(&kind).map_or(0, Vec::len)
    }

    /// Returns the number of post-commit subscribers.
    pub fn post_commit_count(&self) -> usize {
        self.post_commit.len()
    }

    /// Publishes a message to every handler registered for its kind, in
    /// registration order, within the caller's execution context.
    ///
    /// The first handler error propagates to the caller and is treated as
    /// a failure of the publishing operation; a validating handler can
    /// veto the surrounding unit of work this way.
    #[tracing::instrument(skip_all, fields(kind = %message.kind()))]
    pub async fn publish(&self, message: &Message, scope: &OperationScope) -> Result<()> {
        let handlers = self.collecting.get(&message.kind());

        for handler in handlers.into_iter().flatten() {
            handler.handle(message, scope).await?;
        }

        metrics::counter!("mediator_messages_published_total").increment(1);
        Ok(())
    }

    /// Publishes a durable event to every post-commit subscriber.
    ///
    /// Subscriber failures are collected, never propagated: the commit has
    /// already happened, so a failed delivery is reported for the
    /// subscriber's own retry loop instead of failing the operation.
    #[tracing::instrument(skip_all, fields(event_type = %event.event_type, attempt))]
    pub async fn publish_post_commit(
        &self,
        event: &DomainEvent,
        attempt: u32,
    ) -> Vec<DeliveryFailure> {
        let mut failures = Vec::new();

        for subscriber in &self.post_commit {
            if let Err(e) = subscriber.handle(event, attempt).await {
                tracing::warn!(
                    subscriber = subscriber.name(),
                    event_id = %event.event_id,
                    attempt,
                    reason = %e,
                    "post-commit delivery failed"
                );
                metrics::counter!("post_commit_delivery_failures_total").increment(1);
                failures.push(DeliveryFailure {
                    subscriber: subscriber.name(),
                    event_id: event.event_id,
                    attempt,
                    reason: e.to_string(),
                });
            }
        }

        failures
    }
}

/// Builder for the process-wide handler registry.
///
/// Registration happens once at startup, before any publish call; the
/// built mediator is immutable.
#[derive(Default)]
pub struct MediatorBuilder {
    collecting: Vec<(MessageKind, Arc<dyn MessageHandler>)>,
    post_commit: Vec<Arc<dyn PostCommitHandler>>,
}

impl MediatorBuilder {
    /// Registers a collecting-phase handler for a message kind. Handlers
    /// run in registration order.
    pub fn subscribe(mut self, kind: MessageKind, handler: Arc<dyn MessageHandler>) -> Self {
        self.collecting.push((kind, handler));
        self
    }

    /// Registers a post-commit subscriber. Subscribers run in registration
    /// order.
    pub fn subscribe_post_commit(mut self, subscriber: Arc<dyn PostCommitHandler>) -> Self {
        self.post_commit.push(subscriber);
        self
    }

    /// Freezes the registry into a read-only mediator.
    pub fn build(self) -> Mediator {
        let mut collecting: HashMap<MessageKind, Vec<Arc<dyn MessageHandler>>> = HashMap::new();
        for (kind, handler) in self.collecting {
            collecting.entry(kind).or_default().push(handler);
        }

        Mediator {
            collecting,
            post_commit: self.post_commit,
        }
    }
}
