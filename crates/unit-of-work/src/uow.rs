use std::sync::Arc;
use std::time::Instant;

use event_log::{AggregateId, EventLog, EventLogError, EventLogSession, RecordedEvent};
use mediator::{DeliveryFailure, Mediator, Message, OperationScope};
use notifications::{DomainNotification, NotificationRecorder, NotificationSession};

use crate::error::{
    PartialCommitError, Result, StoreKind, UnitOfWorkError, ValidationFailure,
};
use crate::repository::AggregateRepository;
use crate::store::{AggregateStateSession, AggregateStateStore};

/// The in-process handoff is always the first delivery attempt; retries
/// belong to the relay.
const FIRST_ATTEMPT: u32 = 1;

/// Lifecycle state of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowState {
    /// Created, buffers empty.
    Open,

    /// Domain logic is executing; publishes fill the operation scope.
    Collecting,

    /// Inspecting buffered notifications for blocking severity.
    Validating,

    /// Two-phase write across the three stores is in flight.
    Committing,

    /// All three stores committed.
    Committed,

    /// Durable events are being offered to post-commit subscribers.
    Publishing,

    /// Terminal success.
    Done,

    /// Terminal failure; nothing was persisted.
    Aborted,
}

impl std::fmt::Display for UowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UowState::Open => write!(f, "open"),
            UowState::Collecting => write!(f, "collecting"),
            UowState::Validating => write!(f, "validating"),
            UowState::Committing => write!(f, "committing"),
            UowState::Committed => write!(f, "committed"),
            UowState::Publishing => write!(f, "publishing"),
            UowState::Done => write!(f, "done"),
            UowState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Result of a committed unit of work.
#[derive(Debug)]
pub struct CommitReceipt {
    /// The committed events with their global positions, in commit order.
    pub events: Vec<RecordedEvent>,

    /// The notifications persisted alongside the events.
    pub notifications: Vec<DomainNotification>,

    /// Post-commit deliveries that failed and are left to the relay's own
    /// retry loop. A non-empty list does not mean the commit failed.
    pub delivery_failures: Vec<DeliveryFailure>,
}

/// Coordinator for one business operation.
///
/// Exactly one unit of work exists per operation; it owns its buffers
/// exclusively and is consumed by [`commit`](UnitOfWork::commit) or
/// [`discard`](UnitOfWork::discard). Domain logic raises events and
/// notifications through [`publish`](UnitOfWork::publish); the mediator's
/// staging handlers collect them into this unit of work's scope.
///
/// Commit runs a two-phase discipline across the aggregate-state store,
/// the event log, and the notification recorder: every session must
/// prepare before any session commits, and commits are issued in that
/// fixed order. A commit failure after an earlier store committed is
/// surfaced as [`PartialCommitError`]; cancellation during the commit is
/// not supported, since `commit` consumes the unit of work and runs to
/// completion.
pub struct UnitOfWork {
    mediator: Arc<Mediator>,
    scope: OperationScope,
    event_log: Arc<dyn EventLog>,
    recorder: Arc<dyn NotificationRecorder>,
    state_store: Arc<dyn AggregateStateStore>,
    pending_state: Vec<(AggregateId, serde_json::Value)>,
    state: UowState,
}

impl UnitOfWork {
    pub(crate) fn new(
        mediator: Arc<Mediator>,
        scope: OperationScope,
        event_log: Arc<dyn EventLog>,
        recorder: Arc<dyn NotificationRecorder>,
        state_store: Arc<dyn AggregateStateStore>,
    ) -> Self {
        Self {
            mediator,
            scope,
            event_log,
            recorder,
            state_store,
            pending_state: Vec::new(),
            state: UowState::Open,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> UowState {
        self.state
    }

    /// Returns the operation scope for inspection.
    pub fn scope(&self) -> &OperationScope {
        &self.scope
    }

    /// Publishes a message through the mediator within this operation.
    ///
    /// A handler failure aborts the unit of work, exactly like a
    /// validation failure: handlers performing validation can veto.
    pub async fn publish(&mut self, message: impl Into<Message>) -> Result<()> {
        match self.state {
            UowState::Open => self.state = UowState::Collecting,
            UowState::Collecting => {}
            actual => {
                return Err(UnitOfWorkError::State {
                    expected: UowState::Collecting,
                    actual,
                });
            }
        }

        let message = message.into();
        if let Err(e) = self.mediator.publish(&message, &self.scope).await {
            self.mark_aborted();
            tracing::warn!(reason = %e, "dispatch failed, unit of work aborted");
            return Err(UnitOfWorkError::Dispatch(e));
        }
        Ok(())
    }

    /// Buffers an aggregate-state write to be flushed through the
    /// repository at commit.
    pub fn stage_state(
        &mut self,
        aggregate_id: AggregateId,
        state: serde_json::Value,
    ) -> Result<()> {
        match self.state {
            UowState::Open | UowState::Collecting => {
                self.pending_state.push((aggregate_id, state));
                Ok(())
            }
            actual => Err(UnitOfWorkError::State {
                expected: UowState::Collecting,
                actual,
            }),
        }
    }

    /// Cancels the operation before commit. Buffers are dropped; no
    /// persisted side effects exist to undo.
    pub fn discard(self) {
        tracing::debug!(state = %self.state, "unit of work discarded");
    }

    /// Decides the operation and, if allowed, commits all three stores
    /// atomically and publishes the durable events to post-commit
    /// subscribers.
    #[tracing::instrument(skip_all)]
    pub async fn commit(
        mut self,
        repository: &dyn AggregateRepository,
    ) -> Result<CommitReceipt> {
        match self.state {
            UowState::Open | UowState::Collecting => {}
            actual => {
                return Err(UnitOfWorkError::State {
                    expected: UowState::Collecting,
                    actual,
                });
            }
        }

        // Validating: a blocking notification means no store is touched.
        self.state = UowState::Validating;
        let notifications = self.scope.buffered_notifications().await;
        if notifications.iter().any(|n| n.is_blocking()) {
            self.mark_aborted();
            let failure = ValidationFailure { notifications };
            tracing::info!(%failure, "unit of work rejected");
            return Err(UnitOfWorkError::Validation(failure));
        }

        self.state = UowState::Committing;
        let events = self.scope.staged_events().await;
        let started = Instant::now();

        // Phase one: open a session per store and stage every write.
        let mut state_session = match self.state_store.begin_session().await {
            Ok(session) => session,
            Err(e) => {
                self.mark_aborted();
                return Err(storage(StoreKind::AggregateState, e));
            }
        };
        let mut log_session = match self.event_log.begin_session().await {
            Ok(session) => session,
            Err(e) => {
                let _ = state_session.rollback().await;
                self.mark_aborted();
                return Err(map_log_error(e));
            }
        };
        let mut note_session = match self.recorder.begin_session().await {
            Ok(session) => session,
            Err(e) => {
                let _ = state_session.rollback().await;
                let _ = log_session.rollback().await;
                self.mark_aborted();
                return Err(storage(StoreKind::Notifications, e));
            }
        };

        for (aggregate_id, state) in &self.pending_state {
            if let Err(e) = repository
                .save(*aggregate_id, state, state_session.as_mut())
                .await
            {
                rollback_all(&mut state_session, &mut log_session, &mut note_session).await;
                self.mark_aborted();
                return Err(storage(StoreKind::AggregateState, e));
            }
        }
        for event in &events {
            if let Err(e) = log_session.stage(event.clone()) {
                rollback_all(&mut state_session, &mut log_session, &mut note_session).await;
                self.mark_aborted();
                return Err(map_log_error(e));
            }
        }
        for notification in &notifications {
            if let Err(e) = note_session.stage(notification.clone()) {
                rollback_all(&mut state_session, &mut log_session, &mut note_session).await;
                self.mark_aborted();
                return Err(storage(StoreKind::Notifications, e));
            }
        }

        // Every session must prepare before any session commits. The event
        // log's prepare is where a concurrent writer loses the version
        // race, still with nothing durable anywhere.
        if let Err(e) = state_session.prepare().await {
            rollback_all(&mut state_session, &mut log_session, &mut note_session).await;
            self.mark_aborted();
            return Err(storage(StoreKind::AggregateState, e));
        }
        if let Err(e) = log_session.prepare().await {
            rollback_all(&mut state_session, &mut log_session, &mut note_session).await;
            self.mark_aborted();
            return Err(map_log_error(e));
        }
        if let Err(e) = note_session.prepare().await {
            rollback_all(&mut state_session, &mut log_session, &mut note_session).await;
            self.mark_aborted();
            return Err(storage(StoreKind::Notifications, e));
        }

        // Phase two: commit in fixed order. The first commit failing is
        // still recoverable; after that, failures break the atomic group.
        if let Err(e) = state_session.commit().await {
            let _ = log_session.rollback().await;
            let _ = note_session.rollback().await;
            self.mark_aborted();
            return Err(storage(StoreKind::AggregateState, e));
        }

        let recorded = match log_session.commit().await {
            Ok(recorded) => recorded,
            Err(e) => {
                let _ = note_session.rollback().await;
                return Err(self.partial_commit(vec![StoreKind::AggregateState], StoreKind::EventLog, e));
            }
        };

        if let Err(e) = note_session.commit().await {
            return Err(self.partial_commit(
                vec![StoreKind::AggregateState, StoreKind::EventLog],
                StoreKind::Notifications,
                e,
            ));
        }

        self.state = UowState::Committed;
        metrics::counter!("uow_commits_total").increment(1);
        metrics::histogram!("uow_commit_duration_seconds").record(started.elapsed().as_secs_f64());

        // Publishing: the events are durable; failures here are delivery
        // failures for the relay to retry, never a rollback.
        self.state = UowState::Publishing;
        let mut delivery_failures = Vec::new();
        for record in &recorded {
            delivery_failures.extend(
                self.mediator
                    .publish_post_commit(&record.event, FIRST_ATTEMPT)
                    .await,
            );
        }

        self.state = UowState::Done;
        tracing::info!(
            events = recorded.len(),
            notifications = notifications.len(),
            delivery_failures = delivery_failures.len(),
            "unit of work committed"
        );

        Ok(CommitReceipt {
            events: recorded,
            notifications,
            delivery_failures,
        })
    }

    fn mark_aborted(&mut self) {
        self.state = UowState::Aborted;
        metrics::counter!("uow_aborts_total").increment(1);
    }

    fn partial_commit(
        &self,
        committed: Vec<StoreKind>,
        failed: StoreKind,
        reason: impl std::fmt::Display,
    ) -> UnitOfWorkError {
        let error = PartialCommitError {
            committed,
            failed,
            reason: reason.to_string(),
        };
        metrics::counter!("uow_partial_commits_total").increment(1);
        tracing::error!(%error, "atomic group broken, operator attention required");
        UnitOfWorkError::PartialCommit(error)
    }
}

fn storage(store: StoreKind, reason: impl std::fmt::Display) -> UnitOfWorkError {
    UnitOfWorkError::Storage {
        store,
        reason: reason.to_string(),
    }
}

fn map_log_error(e: EventLogError) -> UnitOfWorkError {
    match e {
        EventLogError::VersionConflict {
            aggregate_id,
            version,
            ..
        } => UnitOfWorkError::VersionConflict {
            aggregate_id,
            version,
        },
        other => storage(StoreKind::EventLog, other),
    }
}

async fn rollback_all(
    state: &mut Box<dyn AggregateStateSession>,
    log: &mut Box<dyn EventLogSession>,
    notes: &mut Box<dyn NotificationSession>,
) {
    let _ = state.rollback().await;
    let _ = log.rollback().await;
    let _ = notes.rollback().await;
}
