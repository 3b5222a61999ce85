//! Transactional unit of work for the domain-event pipeline.
//!
//! One [`UnitOfWork`] coordinates one business operation: domain logic
//! raises events and notifications through the mediator, the buffered
//! notifications decide commit versus abort, and the commit runs a
//! two-phase discipline across three independently-managed stores:
//! aggregate state, the append-only event log, and the notification
//! recorder. After all three commit, the durable events are offered to
//! post-commit subscribers such as an outbound relay, with at-least-once
//! semantics.
//!
//! Error taxonomy, in order of severity: [`ValidationFailure`] and
//! [`UnitOfWorkError::VersionConflict`] are recovered by the caller
//! retrying the operation from scratch; [`UnitOfWorkError::Storage`] is a
//! transient failure before anything committed; [`PartialCommitError`]
//! means the atomic group broke apart mid-commit and must be escalated,
//! never auto-retried.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod relay;
pub mod repository;
pub mod store;
pub mod uow;

pub use config::PipelineConfig;
pub use error::{
    PartialCommitError, Result, StateStoreError, StoreKind, UnitOfWorkError, ValidationFailure,
};
pub use pipeline::{Pipeline, PipelineBuilder};
pub use relay::{InMemoryRelay, OutboundRelay, RelaySubscriber};
pub use repository::{AggregateRepository, InMemoryAggregateRepository};
pub use store::{AggregateStateSession, AggregateStateStore, InMemoryStateStore};
pub use uow::{CommitReceipt, UnitOfWork, UowState};
