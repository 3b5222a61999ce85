use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use event_log::DomainEvent;
use mediator::{DeliveryError, PostCommitHandler};

/// Best-effort forwarder of committed events to an external broker.
///
/// The relay is a post-commit subscriber, decoupled from the local commit:
/// it receives each durable event with a delivery attempt number and must
/// implement its own retry/backoff. The pipeline guarantees at-least-once
/// handoff, so an event may be offered more than once across process
/// restarts; consumers deduplicate on `event_id`.
#[async_trait]
pub trait OutboundRelay: Send + Sync {
    /// Stable relay name used in delivery failures and logs.
    fn name(&self) -> &'static str;

    /// Forwards one committed event. `attempt` starts at 1.
    async fn deliver(
        &self,
        event: &DomainEvent,
        attempt: u32,
    ) -> std::result::Result<(), DeliveryError>;
}

/// Adapts an [`OutboundRelay`] into a post-commit subscriber.
pub struct RelaySubscriber<R: OutboundRelay> {
    relay: R,
}

impl<R: OutboundRelay> RelaySubscriber<R> {
    /// Wraps a relay for registration on the mediator.
    pub fn new(relay: R) -> Self {
        Self { relay }
    }
}

#[async_trait]
impl<R: OutboundRelay> PostCommitHandler for RelaySubscriber<R> {
    fn name(&self) -> &'static str {
        self.relay.name()
    }

    async fn handle(
        &self,
        event: &DomainEvent,
        attempt: u32,
    ) -> std::result::Result<(), DeliveryError> {
        self.relay.deliver(event, attempt).await
    }
}

#[derive(Debug, Default)]
struct RelayInner {
    delivered: Vec<(DomainEvent, u32)>,
    fail_on_deliver: bool,
}

/// In-memory relay for testing: records deliveries instead of forwarding.
#[derive(Clone, Default)]
pub struct InMemoryRelay {
    inner: Arc<RwLock<RelayInner>>,
}

impl InMemoryRelay {
    /// Creates a new in-memory relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of delivered events.
    pub fn delivered_count(&self) -> usize {
        self.inner.read().unwrap().delivered.len()
    }

    /// Returns the delivered events in delivery order.
    pub fn delivered(&self) -> Vec<DomainEvent> {
        self.inner
            .read()
            .unwrap()
            .delivered
            .iter()
            .map(|(event, _)| event.clone())
            .collect()
    }

    /// Configures the relay to fail every delivery.
    pub fn set_fail_on_deliver(&self, fail: bool) {
        self.inner.write().unwrap().fail_on_deliver = fail;
    }
}

#[async_trait]
impl OutboundRelay for InMemoryRelay {
    fn name(&self) -> &'static str {
        "in-memory-relay"
    }

    async fn deliver(
        &self,
        event: &DomainEvent,
        attempt: u32,
    ) -> std::result::Result<(), DeliveryError> {
        let mut inner = self.inner.write().unwrap();
        if inner.fail_on_deliver {
            return Err(DeliveryError::new("relay configured to fail"));
        }
        inner.delivered.push((event.clone(), attempt));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_log::{AggregateId, Version};

    fn make_event() -> DomainEvent {
        DomainEvent::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("User")
            .event_type("UserCreated")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
    }

    #[tokio::test]
    async fn relay_records_deliveries_in_order() {
        let relay = InMemoryRelay::new();
        let e1 = make_event();
        let e2 = make_event();

        relay.deliver(&e1, 1).await.unwrap();
        relay.deliver(&e2, 1).await.unwrap();

        let delivered = relay.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].event_id, e1.event_id);
        assert_eq!(delivered[1].event_id, e2.event_id);
    }

    #[tokio::test]
    async fn failing_relay_records_nothing() {
        let relay = InMemoryRelay::new();
        relay.set_fail_on_deliver(true);

        let result = relay.deliver(&make_event(), 1).await;
        assert!(result.is_err());
        assert_eq!(relay.delivered_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_adapter_forwards_to_relay() {
        let relay = InMemoryRelay::new();
        let subscriber = RelaySubscriber::new(relay.clone());

        subscriber.handle(&make_event(), 1).await.unwrap();
        assert_eq!(relay.delivered_count(), 1);
        assert_eq!(subscriber.name(), "in-memory-relay");
    }
}
