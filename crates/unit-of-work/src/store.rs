use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use event_log::AggregateId;

use crate::error::StateStoreError;

type Result<T> = std::result::Result<T, StateStoreError>;

/// Store for current aggregate state.
///
/// Participates in the unit of work's atomic group through the same
/// two-phase session discipline as the other stores. Repositories write
/// through an externally supplied session so their writes land in the same
/// transaction as the event log and notifications.
#[async_trait]
pub trait AggregateStateStore: Send + Sync {
    /// Opens a write session against the store.
    async fn begin_session(&self) -> Result<Box<dyn AggregateStateSession>>;

    /// Returns the committed state of an aggregate, or None if the
    /// aggregate has never been committed.
    async fn get(&self, aggregate_id: AggregateId) -> Result<Option<serde_json::Value>>;
}

/// One write session in the state store's two-phase commit discipline.
#[async_trait]
pub trait AggregateStateSession: Send {
    /// Stages a state write. Nothing is durable until `commit`.
    fn stage(&mut self, aggregate_id: AggregateId, state: serde_json::Value) -> Result<()>;

    /// Validates the session and readies the staged writes.
    async fn prepare(&mut self) -> Result<()>;

    /// Makes the prepared writes durable.
    async fn commit(&mut self) -> Result<()>;

    /// Releases the session; staged writes are discarded.
    async fn rollback(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Staging,
    Prepared,
    Finished,
}

#[derive(Debug, Default)]
struct StateStoreInner {
    committed: HashMap<AggregateId, serde_json::Value>,
    fail_next_prepare: bool,
    fail_next_commit: bool,
}

/// In-memory aggregate-state store for testing and embedding defaults.
#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    inner: Arc<RwLock<StateStoreInner>>,
}

impl InMemoryStateStore {
    /// Creates a new empty in-memory state store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed aggregates.
    pub fn aggregate_count(&self) -> usize {
        self.inner.read().unwrap().committed.len()
    }

    /// Configures the store to fail the next session prepare.
    pub fn set_fail_next_prepare(&self, fail: bool) {
        self.inner.write().unwrap().fail_next_prepare = fail;
    }

    /// Configures the store to fail the next session commit.
    pub fn set_fail_next_commit(&self, fail: bool) {
        self.inner.write().unwrap().fail_next_commit = fail;
    }
}

#[async_trait]
impl AggregateStateStore for InMemoryStateStore {
    async fn begin_session(&self) -> Result<Box<dyn AggregateStateSession>> {
        Ok(Box::new(InMemoryStateSession {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            phase: Phase::Staging,
        }))
    }

    async fn get(&self, aggregate_id: AggregateId) -> Result<Option<serde_json::Value>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.committed.get(&aggregate_id).cloned())
    }
}

/// Write session against an [`InMemoryStateStore`].
pub struct InMemoryStateSession {
    inner: Arc<RwLock<StateStoreInner>>,
    staged: Vec<(AggregateId, serde_json::Value)>,
    phase: Phase,
}

#[async_trait]
impl AggregateStateSession for InMemoryStateSession {
    fn stage(&mut self, aggregate_id: AggregateId, state: serde_json::Value) -> Result<()> {
        if self.phase != Phase::Staging {
            return Err(StateStoreError::Session("stage requires a staging session"));
        }
        self.staged.push((aggregate_id, state));
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        if self.phase != Phase::Staging {
            return Err(StateStoreError::Session(
                "prepare requires a staging session",
            ));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.fail_next_prepare {
            inner.fail_next_prepare = false;
            self.phase = Phase::Finished;
            return Err(StateStoreError::Storage("injected prepare failure".into()));
        }

        self.phase = Phase::Prepared;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.phase != Phase::Prepared {
            return Err(StateStoreError::Session(
                "commit requires a prepared session",
            ));
        }

        let mut inner = self.inner.write().unwrap();
        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            self.phase = Phase::Finished;
            return Err(StateStoreError::Storage("injected commit failure".into()));
        }

        for (aggregate_id, state) in self.staged.drain(..) {
            inner.committed.insert(aggregate_id, state);
        }
        self.phase = Phase::Finished;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.phase = Phase::Finished;
        Ok(())
    }
}
