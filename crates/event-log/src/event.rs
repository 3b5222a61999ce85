use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AggregateId, EventId};

/// Per-aggregate version number, used for optimistic concurrency control.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event on an aggregate. Once committed, the versions of an
/// aggregate's events form a contiguous sequence with no gaps.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for an aggregate with no events.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// Position of a committed event in the log's global order.
///
/// Positions are assigned at commit time, strictly increasing across all
/// aggregates. Commit order is the only serialization point the log exposes;
/// event timestamps carry no ordering guarantee.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GlobalPosition(u64);

impl GlobalPosition {
    /// Creates a position from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the position before the first committed event.
    ///
    /// `read_all(GlobalPosition::start())` yields the whole log.
    pub fn start() -> Self {
        Self(0)
    }

    /// Returns the next position.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw position value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GlobalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable domain event record.
///
/// Created by domain logic during a unit of work, staged against a log
/// session, and made durable at commit. Events are never mutated or deleted
/// after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique identifier for this event.
    pub event_id: EventId,

    /// The aggregate this event belongs to.
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "User", "Tenant").
    pub aggregate_type: String,

    /// The type of the event (e.g., "UserCreated", "TenantDeactivated").
    pub event_type: String,

    /// The event payload as JSON.
    pub payload: serde_json::Value,

    /// The version of the aggregate after this event.
    pub version: Version,

    /// When the event was raised.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Creates a new domain event builder.
    pub fn builder() -> DomainEventBuilder {
        DomainEventBuilder::default()
    }
}

/// A committed domain event paired with its global position.
///
/// Returned by `read_all` and by session commits; the position reflects
/// commit order across all aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Position in the log's global commit order.
    pub position: GlobalPosition,

    /// The committed event.
    pub event: DomainEvent,
}

/// Builder for constructing domain events.
#[derive(Debug, Default)]
pub struct DomainEventBuilder {
    event_id: Option<EventId>,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    event_type: Option<String>,
    payload: Option<serde_json::Value>,
    version: Option<Version>,
    occurred_at: Option<DateTime<Utc>>,
}

impl DomainEventBuilder {
    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn event_id(mut self, id: EventId) -> Self {
        self.event_id = Some(id);
        self
    }

    /// Sets the aggregate ID.
    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    /// Sets the aggregate type.
    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Sets the payload from a serializable value.
    pub fn payload<T: serde::Serialize>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Sets the version.
    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    /// Sets the timestamp. If not set, the current time will be used.
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Builds the domain event.
    ///
    /// # Panics
    ///
    /// Panics if required fields (aggregate_id, aggregate_type, event_type,
    /// payload, version) are not set.
    pub fn build(self) -> DomainEvent {
        DomainEvent {
            event_id: self.event_id.unwrap_or_default(),
            aggregate_id: self.aggregate_id.expect("aggregate_id is required"),
            aggregate_type: self.aggregate_type.expect("aggregate_type is required"),
            event_type: self.event_type.expect("event_type is required"),
            payload: self.payload.expect("payload is required"),
            version: self.version.expect("version is required"),
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        }
    }

    /// Tries to build the domain event, returning None if required fields
    /// are missing.
    pub fn try_build(self) -> Option<DomainEvent> {
        Some(DomainEvent {
            event_id: self.event_id.unwrap_or_default(),
            aggregate_id: self.aggregate_id?,
            aggregate_type: self.aggregate_type?,
            event_type: self.event_type?,
            payload: self.payload?,
            version: self.version?,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
        })
    }
}
