use async_trait::async_trait;

use event_log::AggregateId;

use crate::error::StateStoreError;
use crate::store::{AggregateStateSession, AggregateStateStore, InMemoryStateStore};

type Result<T> = std::result::Result<T, StateStoreError>;

/// Repository for aggregate state, consumed by the unit of work.
///
/// `save` must accept an externally supplied session so the repository's
/// write participates in the unit of work's atomic group; the repository
/// never commits on its own.
#[async_trait]
pub trait AggregateRepository: Send + Sync {
    /// Loads the committed state of an aggregate.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<serde_json::Value>>;

    /// Stages an aggregate-state write through the given session.
    async fn save(
        &self,
        aggregate_id: AggregateId,
        state: &serde_json::Value,
        session: &mut dyn AggregateStateSession,
    ) -> Result<()>;
}

/// Repository backed by an [`InMemoryStateStore`], used in tests and as
/// the embedding default.
#[derive(Clone)]
pub struct InMemoryAggregateRepository {
    store: InMemoryStateStore,
}

impl InMemoryAggregateRepository {
    /// Creates a repository over the given store.
    pub fn new(store: InMemoryStateStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AggregateRepository for InMemoryAggregateRepository {
    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<serde_json::Value>> {
        self.store.get(aggregate_id).await
    }

    async fn save(
        &self,
        aggregate_id: AggregateId,
        state: &serde_json::Value,
        session: &mut dyn AggregateStateSession,
    ) -> Result<()> {
        session.stage(aggregate_id, state.clone())
    }
}
