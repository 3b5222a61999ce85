//! Append-only domain event log.
//!
//! Events are staged against a two-phase write session (stage → prepare →
//! commit/rollback) so a surrounding unit of work can coordinate this log
//! with other stores. Version conflicts surface at prepare time, before
//! anything is durable. Committed events carry a global position assigned
//! in commit order.

pub mod error;
pub mod event;
pub mod ids;
pub mod log;
pub mod memory;

pub use error::{EventLogError, Result};
pub use event::{DomainEvent, DomainEventBuilder, GlobalPosition, RecordedEvent, Version};
pub use ids::{AggregateId, EventId};
pub use log::{EventLog, EventLogSession, EventStream, RecordedEventStream};
pub use memory::InMemoryEventLog;
