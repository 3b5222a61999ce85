use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::{EventLogError, Result};
use crate::event::{DomainEvent, GlobalPosition, RecordedEvent, Version};
use crate::ids::AggregateId;

/// A finite stream of domain events for one aggregate, in version order.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<DomainEvent>> + Send>>;

/// A finite stream of committed events in global commit order.
pub type RecordedEventStream = Pin<Box<dyn Stream<Item = Result<RecordedEvent>> + Send>>;

/// Core trait for event log implementations.
///
/// The log is append-only and per-aggregate ordered. Writes go through a
/// two-phase session: events are staged, the session is prepared (which is
/// where version conflicts surface, before anything is durable), and only
/// then committed. Read surfaces are safe for concurrent use and never
/// mutate the log.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Opens a write session against the log.
    ///
    /// The session must be driven through `prepare` and then `commit`, or
    /// released with `rollback`.
    async fn begin_session(&self) -> Result<Box<dyn EventLogSession>>;

    /// Streams the events of one aggregate in ascending version order,
    /// starting at `from_version` (inclusive).
    ///
    /// Each call snapshots storage and yields a fresh, restartable stream;
    /// two calls without intervening writes yield identical sequences.
    async fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<EventStream>;

    /// Streams all committed events after `after`, in global commit order.
    ///
    /// Commit order is the only externally observable serialization point;
    /// projections and relays resume from the last position they saw.
    async fn read_all(&self, after: GlobalPosition) -> Result<RecordedEventStream>;

    /// Returns the current committed version of an aggregate, or None if
    /// the aggregate has no committed events.
    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// One write session in the log's two-phase commit discipline.
///
/// Lifecycle: `stage` any number of events, `prepare` exactly once, then
/// `commit` or `rollback` exactly once. `prepare` reserves the staged
/// `(aggregate, version)` slots, so of two racing sessions over the same
/// slot exactly one prepares successfully; the other fails with
/// `VersionConflict` before any store has committed.
#[async_trait]
pub trait EventLogSession: Send {
    /// Stages an event for this session. Nothing is durable until `commit`.
    fn stage(&mut self, event: DomainEvent) -> Result<()>;

    /// Validates the staged batch and reserves its version slots.
    ///
    /// Fails with `VersionConflict` if any staged slot is already committed
    /// or reserved by another prepared session.
    async fn prepare(&mut self) -> Result<()>;

    /// Makes the prepared events durable, assigning contiguous global
    /// positions in commit order. Returns the recorded events.
    async fn commit(&mut self) -> Result<Vec<RecordedEvent>>;

    /// Releases the session and any reservations it holds. Staged events
    /// are discarded.
    async fn rollback(&mut self) -> Result<()>;
}

/// Validates that a staged batch has contiguous versions per aggregate.
///
/// The expected first version for each aggregate is supplied by the caller
/// (the committed version plus one).
pub fn validate_staged_events(
    events: &[DomainEvent],
    committed: &HashMap<AggregateId, Version>,
) -> Result<()> {
    let mut expected: HashMap<AggregateId, Version> = HashMap::new();

    for event in events {
        let next = expected.entry(event.aggregate_id).or_insert_with(|| {
            committed
                .get(&event.aggregate_id)
                .copied()
                .unwrap_or_else(Version::initial)
                .next()
        });

        if event.version != *next {
            return Err(EventLogError::InvalidBatch(format!(
                "aggregate {}: expected version {}, got {}",
                event.aggregate_id, next, event.version
            )));
        }
        *next = next.next();
    }

    Ok(())
}
