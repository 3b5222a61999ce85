//! Integration tests for the full pipeline: collect, validate, commit
//! across three stores, and publish post-commit.

use std::sync::Arc;

use event_log::{
    AggregateId, DomainEvent, EventLog, GlobalPosition, InMemoryEventLog, Version,
};
use futures_util::StreamExt;
use notifications::{DomainNotification, InMemoryNotificationRecorder, NotificationRecorder};
use unit_of_work::{
    AggregateStateStore, InMemoryAggregateRepository, InMemoryRelay, InMemoryStateStore, Pipeline,
    StoreKind, UnitOfWorkError,
};

struct Harness {
    pipeline: Pipeline,
    event_log: InMemoryEventLog,
    recorder: InMemoryNotificationRecorder,
    state_store: InMemoryStateStore,
    repository: InMemoryAggregateRepository,
    relay: InMemoryRelay,
}

/// Wires a pipeline over in-memory stores with a recording relay.
fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let event_log = InMemoryEventLog::new();
    let recorder = InMemoryNotificationRecorder::new();
    let state_store = InMemoryStateStore::new();
    let relay = InMemoryRelay::new();

    let pipeline = Pipeline::builder()
        .event_log(Arc::new(event_log.clone()))
        .notification_recorder(Arc::new(recorder.clone()))
        .state_store(Arc::new(state_store.clone()))
        .relay(relay.clone())
        .build();

    let repository = InMemoryAggregateRepository::new(state_store.clone());

    Harness {
        pipeline,
        event_log,
        recorder,
        state_store,
        repository,
        relay,
    }
}

fn make_event(aggregate_id: AggregateId, version: i64, payload: serde_json::Value) -> DomainEvent {
    DomainEvent::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("User")
        .event_type("UserChanged")
        .version(Version::new(version))
        .payload_raw(payload)
        .build()
}

async fn read_events(log: &InMemoryEventLog, aggregate_id: AggregateId) -> Vec<DomainEvent> {
    log.read_stream(aggregate_id, Version::first())
        .await
        .unwrap()
        .map(|r| r.unwrap())
        .collect()
        .await
}

/// Commits `count` events for an aggregate, one unit of work per event.
async fn seed_events(h: &Harness, aggregate_id: AggregateId, count: i64) {
    for version in 1..=count {
        let mut uow = h.pipeline.begin();
        uow.publish(make_event(
            aggregate_id,
            version,
            serde_json::json!({"seed": version}),
        ))
        .await
        .unwrap();
        uow.commit(&h.repository).await.unwrap();
    }
}

mod happy_path {
    use super::*;

    #[tokio::test]
    async fn two_events_commit_and_reach_the_relay_once_each() {
        let h = harness();
        let aggregate_id = AggregateId::new();

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({"step": 1})))
            .await
            .unwrap();
        uow.publish(make_event(aggregate_id, 2, serde_json::json!({"step": 2})))
            .await
            .unwrap();
        uow.stage_state(aggregate_id, serde_json::json!({"version": 2}))
            .unwrap();

        let receipt = uow.commit(&h.repository).await.unwrap();
        assert_eq!(receipt.events.len(), 2);
        assert!(receipt.delivery_failures.is_empty());

        // The stream returns both events in version order.
        let events = read_events(&h.event_log, aggregate_id).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].version, Version::new(1));
        assert_eq!(events[1].version, Version::new(2));

        // Aggregate state landed in the same commit.
        assert_eq!(
            h.state_store.get(aggregate_id).await.unwrap(),
            Some(serde_json::json!({"version": 2}))
        );

        // Each event was handed to the relay exactly once, in order.
        let delivered = h.relay.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].event_id, events[0].event_id);
        assert_eq!(delivered[1].event_id, events[1].event_id);
    }

    #[tokio::test]
    async fn payload_survives_the_roundtrip_unchanged() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        let payload = serde_json::json!({
            "email": "user@example.com",
            "roles": ["admin", "auditor"],
            "quota": 42
        });

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, payload.clone()))
            .await
            .unwrap();
        uow.commit(&h.repository).await.unwrap();

        let events = read_events(&h.event_log, aggregate_id).await;
        assert_eq!(events[0].payload, payload);
    }

    #[tokio::test]
    async fn read_stream_is_idempotent_without_intervening_writes() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        seed_events(&h, aggregate_id, 3).await;

        let first = read_events(&h.event_log, aggregate_id).await;
        let second = read_events(&h.event_log, aggregate_id).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn non_blocking_notifications_are_persisted_with_the_commit() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        let key = aggregate_id.to_string();

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.publish(DomainNotification::info("user", &key, "user created"))
            .await
            .unwrap();
        uow.publish(DomainNotification::warning("user", &key, "weak password"))
            .await
            .unwrap();

        let receipt = uow.commit(&h.repository).await.unwrap();
        assert_eq!(receipt.notifications.len(), 2);

        let recorded = h.recorder.query_by_key("user", &key).await.unwrap();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].message, "user created");
        assert_eq!(recorded[1].message, "weak password");
    }

    #[tokio::test]
    async fn global_order_reflects_commit_order_across_aggregates() {
        let h = harness();
        let a = AggregateId::new();
        let b = AggregateId::new();

        seed_events(&h, a, 1).await;
        seed_events(&h, b, 1).await;

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(a, 2, serde_json::json!({}))).await.unwrap();
        uow.commit(&h.repository).await.unwrap();

        let records: Vec<_> = h
            .event_log
            .read_all(GlobalPosition::start())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].event.aggregate_id, a);
        assert_eq!(records[1].event.aggregate_id, b);
        assert_eq!(records[2].event.aggregate_id, a);
        // Positions are contiguous in commit order.
        let positions: Vec<u64> = records.iter().map(|r| r.position.as_u64()).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }
}

mod aborts {
    use super::*;

    #[tokio::test]
    async fn blocking_notification_aborts_with_nothing_persisted() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        let key = aggregate_id.to_string();

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.publish(make_event(aggregate_id, 2, serde_json::json!({})))
            .await
            .unwrap();
        uow.stage_state(aggregate_id, serde_json::json!({"v": 2}))
            .unwrap();
        uow.publish(DomainNotification::error("user", &key, "email taken"))
            .await
            .unwrap();

        let result = uow.commit(&h.repository).await;
        let Err(UnitOfWorkError::Validation(failure)) = result else {
            panic!("expected validation failure");
        };

        // The rejection reason travels back to the caller.
        assert_eq!(failure.blocking().count(), 1);
        assert_eq!(failure.notifications.len(), 1);

        // No store observed anything.
        assert!(read_events(&h.event_log, aggregate_id).await.is_empty());
        assert_eq!(h.state_store.get(aggregate_id).await.unwrap(), None);
        assert!(h.recorder.query_by_key("user", &key).await.unwrap().is_empty());
        assert_eq!(h.relay.delivered_count(), 0);
    }

    #[tokio::test]
    async fn discard_before_commit_leaves_no_trace() {
        let h = harness();
        let aggregate_id = AggregateId::new();

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.stage_state(aggregate_id, serde_json::json!({"v": 1}))
            .unwrap();
        uow.discard();

        assert_eq!(h.event_log.event_count().await, 0);
        assert_eq!(h.state_store.get(aggregate_id).await.unwrap(), None);
        assert_eq!(h.relay.delivered_count(), 0);
    }

    #[tokio::test]
    async fn storage_failure_before_any_commit_is_retryable() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        h.state_store.set_fail_next_prepare(true);

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.stage_state(aggregate_id, serde_json::json!({"v": 1}))
            .unwrap();

        let result = uow.commit(&h.repository).await;
        assert!(matches!(
            result,
            Err(UnitOfWorkError::Storage {
                store: StoreKind::AggregateState,
                ..
            })
        ));
        assert_eq!(h.event_log.event_count().await, 0);

        // Retrying the whole operation from scratch succeeds.
        let mut retry = h.pipeline.begin();
        retry
            .publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        retry
            .stage_state(aggregate_id, serde_json::json!({"v": 1}))
            .unwrap();
        retry.commit(&h.repository).await.unwrap();
        assert_eq!(h.event_log.event_count().await, 1);
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn concurrent_commits_produce_exactly_one_winner() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        seed_events(&h, aggregate_id, 3).await;

        // Both operations loaded the aggregate at version 3 and race to
        // commit version 4.
        let mut first = h.pipeline.begin();
        first
            .publish(make_event(aggregate_id, 4, serde_json::json!({"writer": "first"})))
            .await
            .unwrap();
        first
            .stage_state(aggregate_id, serde_json::json!({"writer": "first"}))
            .unwrap();

        let mut second = h.pipeline.begin();
        second
            .publish(make_event(aggregate_id, 4, serde_json::json!({"writer": "second"})))
            .await
            .unwrap();
        second
            .stage_state(aggregate_id, serde_json::json!({"writer": "second"}))
            .unwrap();

        let (r1, r2) = tokio::join!(first.commit(&h.repository), second.commit(&h.repository));

        let winners = [r1.is_ok(), r2.is_ok()].iter().filter(|w| **w).count();
        assert_eq!(winners, 1);

        let loser = if r1.is_ok() { r2 } else { r1 };
        assert!(matches!(
            loser,
            Err(UnitOfWorkError::VersionConflict { .. })
        ));

        // Exactly one version-4 event exists; versions stay contiguous.
        let events = read_events(&h.event_log, aggregate_id).await;
        assert_eq!(events.len(), 4);
        let versions: Vec<i64> = events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2, 3, 4]);

        // The committed state belongs to the winner.
        let winner_payload = &events[3].payload["writer"];
        let state = h.state_store.get(aggregate_id).await.unwrap().unwrap();
        assert_eq!(&state["writer"], winner_payload);

        // Only the winner's event reached the relay.
        assert_eq!(h.relay.delivered_count(), 4);
    }

    #[tokio::test]
    async fn versions_stay_contiguous_across_sequential_operations() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        seed_events(&h, aggregate_id, 5).await;

        let events = read_events(&h.event_log, aggregate_id).await;
        let versions: Vec<i64> = events.iter().map(|e| e.version.as_i64()).collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn stale_writer_must_retry_from_scratch() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        seed_events(&h, aggregate_id, 1).await;

        // A writer that loaded version 1 loses to one that already
        // committed version 2.
        let mut fresh = h.pipeline.begin();
        fresh
            .publish(make_event(aggregate_id, 2, serde_json::json!({})))
            .await
            .unwrap();
        fresh.commit(&h.repository).await.unwrap();

        let mut stale = h.pipeline.begin();
        stale
            .publish(make_event(aggregate_id, 2, serde_json::json!({})))
            .await
            .unwrap();
        let result = stale.commit(&h.repository).await;
        assert!(matches!(
            result,
            Err(UnitOfWorkError::VersionConflict { .. })
        ));

        // Reload, redo, retry: the next version is free.
        let current = h
            .event_log
            .current_version(aggregate_id)
            .await
            .unwrap()
            .unwrap();
        let mut retry = h.pipeline.begin();
        retry
            .publish(make_event(
                aggregate_id,
                current.next().as_i64(),
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        retry.commit(&h.repository).await.unwrap();
    }
}

mod partial_commits {
    use super::*;

    #[tokio::test]
    async fn state_commit_failure_before_other_commits_is_not_partial() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        h.state_store.set_fail_next_commit(true);

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.stage_state(aggregate_id, serde_json::json!({"v": 1}))
            .unwrap();

        // Aggregate state commits first; when it fails, nothing has
        // committed anywhere, so this is a plain retryable storage error.
        let result = uow.commit(&h.repository).await;
        assert!(matches!(
            result,
            Err(UnitOfWorkError::Storage {
                store: StoreKind::AggregateState,
                ..
            })
        ));
        assert!(read_events(&h.event_log, aggregate_id).await.is_empty());
        assert_eq!(h.state_store.get(aggregate_id).await.unwrap(), None);

        let mut retry = h.pipeline.begin();
        retry
            .publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        retry
            .stage_state(aggregate_id, serde_json::json!({"v": 1}))
            .unwrap();
        retry.commit(&h.repository).await.unwrap();
    }

    #[tokio::test]
    async fn event_log_commit_failure_after_state_commit_is_partial() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        h.event_log.set_fail_next_commit(true).await;

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.stage_state(aggregate_id, serde_json::json!({"v": 1}))
            .unwrap();

        let result = uow.commit(&h.repository).await;
        let Err(UnitOfWorkError::PartialCommit(error)) = result else {
            panic!("expected partial commit");
        };

        assert_eq!(error.committed, vec![StoreKind::AggregateState]);
        assert_eq!(error.failed, StoreKind::EventLog);

        // The inconsistency is observable: state committed, log did not.
        assert!(h.state_store.get(aggregate_id).await.unwrap().is_some());
        assert!(read_events(&h.event_log, aggregate_id).await.is_empty());
        // Nothing was offered to the relay.
        assert_eq!(h.relay.delivered_count(), 0);
    }

    #[tokio::test]
    async fn notification_commit_failure_names_both_committed_stores() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        let key = aggregate_id.to_string();
        h.recorder.set_fail_next_commit(true);

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.publish(DomainNotification::info("user", &key, "created"))
            .await
            .unwrap();

        let result = uow.commit(&h.repository).await;
        let Err(UnitOfWorkError::PartialCommit(error)) = result else {
            panic!("expected partial commit");
        };

        assert_eq!(
            error.committed,
            vec![StoreKind::AggregateState, StoreKind::EventLog]
        );
        assert_eq!(error.failed, StoreKind::Notifications);

        // The first two stores kept their writes.
        assert_eq!(read_events(&h.event_log, aggregate_id).await.len(), 1);
        assert!(h.recorder.query_by_key("user", &key).await.unwrap().is_empty());
    }
}

mod post_commit {
    use super::*;

    #[tokio::test]
    async fn relay_failure_is_reported_without_rolling_back() {
        let h = harness();
        let aggregate_id = AggregateId::new();
        h.relay.set_fail_on_deliver(true);

        let mut uow = h.pipeline.begin();
        uow.publish(make_event(aggregate_id, 1, serde_json::json!({})))
            .await
            .unwrap();
        uow.publish(make_event(aggregate_id, 2, serde_json::json!({})))
            .await
            .unwrap();

        let receipt = uow.commit(&h.repository).await.unwrap();

        // The commit stands; both deliveries are reported as failed with
        // the first attempt number.
        assert_eq!(receipt.events.len(), 2);
        assert_eq!(receipt.delivery_failures.len(), 2);
        assert!(receipt.delivery_failures.iter().all(|f| f.attempt == 1));
        assert_eq!(read_events(&h.event_log, aggregate_id).await.len(), 2);
        assert_eq!(h.relay.delivered_count(), 0);
    }

    #[tokio::test]
    async fn relay_can_resume_from_a_known_position() {
        let h = harness();
        let a = AggregateId::new();
        let b = AggregateId::new();
        seed_events(&h, a, 2).await;
        seed_events(&h, b, 1).await;

        // A relay that confirmed up to position 2 re-reads the tail.
        let tail: Vec<_> = h
            .event_log
            .read_all(GlobalPosition::new(2))
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].event.aggregate_id, b);
    }
}
