use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{EventLogError, Result};
use crate::event::{DomainEvent, GlobalPosition, RecordedEvent, Version};
use crate::ids::AggregateId;
use crate::log::{
    EventLog, EventLogSession, EventStream, RecordedEventStream, validate_staged_events,
};

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Staging,
    Prepared,
    Finished,
}

#[derive(Debug, Default)]
struct LogInner {
    /// Committed events in commit order.
    events: Vec<RecordedEvent>,

    /// Last assigned global position.
    position: GlobalPosition,

    /// Version slots held by prepared-but-uncommitted sessions.
    reservations: HashSet<(AggregateId, i64)>,

    /// Fault injection: fail the next session commit with a storage error.
    fail_next_commit: bool,
}

impl LogInner {
    fn committed_version(&self, aggregate_id: AggregateId) -> Version {
        self.events
            .iter()
            .filter(|r| r.event.aggregate_id == aggregate_id)
            .map(|r| r.event.version)
            .max()
            .unwrap_or_else(Version::initial)
    }
}

/// In-memory event log implementation for testing and embedding defaults.
///
/// Version slots are reserved at prepare time under the log's write lock,
/// so of two sessions racing for the same slot exactly one prepares; the
/// loser observes `VersionConflict` before anything is durable.
#[derive(Clone, Default)]
pub struct InMemoryEventLog {
    inner: Arc<RwLock<LogInner>>,
}

impl InMemoryEventLog {
    /// Creates a new empty in-memory event log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of committed events.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }

    /// Clears all committed events and reservations.
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.events.clear();
        inner.reservations.clear();
        inner.position = GlobalPosition::start();
    }

    /// Configures the log to fail the next session commit.
    pub async fn set_fail_next_commit(&self, fail: bool) {
        self.inner.write().await.fail_next_commit = fail;
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn begin_session(&self) -> Result<Box<dyn EventLogSession>> {
        Ok(Box::new(InMemoryEventLogSession {
            inner: Arc::clone(&self.inner),
            staged: Vec::new(),
            reserved: Vec::new(),
            phase: Phase::Staging,
        }))
    }

    async fn read_stream(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<EventStream> {
        use futures_util::stream;

        let inner = self.inner.read().await;
        let mut events: Vec<DomainEvent> = inner
            .events
            .iter()
            .filter(|r| r.event.aggregate_id == aggregate_id && r.event.version >= from_version)
            .map(|r| r.event.clone())
            .collect();
        events.sort_by_key(|e| e.version);

        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }

    async fn read_all(&self, after: GlobalPosition) -> Result<RecordedEventStream> {
        use futures_util::stream;

        let inner = self.inner.read().await;
        let mut records: Vec<RecordedEvent> = inner
            .events
            .iter()
            .filter(|r| r.position > after)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.position);

        Ok(Box::pin(stream::iter(records.into_iter().map(Ok))))
    }

    async fn current_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let inner = self.inner.read().await;
        let version = inner
            .events
            .iter()
            .filter(|r| r.event.aggregate_id == aggregate_id)
            .map(|r| r.event.version)
            .max();
        Ok(version)
    }
}

/// Write session against an [`InMemoryEventLog`].
pub struct InMemoryEventLogSession {
    inner: Arc<RwLock<LogInner>>,
    staged: Vec<DomainEvent>,
    reserved: Vec<(AggregateId, i64)>,
    phase: Phase,
}

#[async_trait]
impl EventLogSession for InMemoryEventLogSession {
    fn stage(&mut self, event: DomainEvent) -> Result<()> {
        if self.phase != Phase::Staging {
            return Err(EventLogError::Session("stage requires a staging session"));
        }
        self.staged.push(event);
        Ok(())
    }

    async fn prepare(&mut self) -> Result<()> {
        if self.phase != Phase::Staging {
            return Err(EventLogError::Session("prepare requires a staging session"));
        }

        let mut inner = self.inner.write().await;

        let committed: HashMap<AggregateId, Version> = self
            .staged
            .iter()
            .map(|e| e.aggregate_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .map(|id| (id, inner.committed_version(id)))
            .collect();

        // Conflict detection first: a stale or reserved slot means another
        // writer won the race for this aggregate.
        for event in &self.staged {
            let current = committed[&event.aggregate_id];
            let slot = (event.aggregate_id, event.version.as_i64());
            if event.version <= current || inner.reservations.contains(&slot) {
                metrics::counter!("event_log_version_conflicts_total").increment(1);
                tracing::warn!(
                    aggregate_id = %event.aggregate_id,
                    version = %event.version,
                    current = %current,
                    "version conflict detected at prepare"
                );
                return Err(EventLogError::VersionConflict {
                    aggregate_id: event.aggregate_id,
                    version: event.version,
                    current,
                });
            }
        }

        validate_staged_events(&self.staged, &committed)?;

        for event in &self.staged {
            let slot = (event.aggregate_id, event.version.as_i64());
            inner.reservations.insert(slot);
            self.reserved.push(slot);
        }

        self.phase = Phase::Prepared;
        Ok(())
    }

    async fn commit(&mut self) -> Result<Vec<RecordedEvent>> {
        if self.phase != Phase::Prepared {
            return Err(EventLogError::Session("commit requires a prepared session"));
        }

        let mut inner = self.inner.write().await;

        if inner.fail_next_commit {
            inner.fail_next_commit = false;
            for slot in self.reserved.drain(..) {
                inner.reservations.remove(&slot);
            }
            self.phase = Phase::Finished;
            return Err(EventLogError::Storage("injected commit failure".into()));
        }

        let mut recorded = Vec::with_capacity(self.staged.len());
        for event in self.staged.drain(..) {
            let position = inner.position.next();
            inner.position = position;
            let record = RecordedEvent { position, event };
            inner.events.push(record.clone());
            recorded.push(record);
        }

        for slot in self.reserved.drain(..) {
            inner.reservations.remove(&slot);
        }

        self.phase = Phase::Finished;
        metrics::counter!("event_log_events_committed_total").increment(recorded.len() as u64);
        Ok(recorded)
    }

    async fn rollback(&mut self) -> Result<()> {
        if self.phase == Phase::Finished {
            return Ok(());
        }

        let mut inner = self.inner.write().await;
        for slot in self.reserved.drain(..) {
            inner.reservations.remove(&slot);
        }
        self.staged.clear();
        self.phase = Phase::Finished;
        Ok(())
    }
}
