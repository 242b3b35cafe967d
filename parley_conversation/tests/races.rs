//! Interleavings that need a hand-driven store.

mod common;

use chrono::Duration;
use common::{FlakyStore, GatedStore, base_time, manager};
use parley_conversation::{ConversationError, EndReason, NewConversation, SweeperConfig};
use parley_core::{ConversationStatus, ConversationStore, ManualClock, MessageDraft};
use parley_store::InMemoryStore;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn turn_landing_during_sweep_keeps_conversation_alive() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let manager = Arc::new(manager(GatedStore::new(InMemoryStore::new()), &clock));
    let opened = manager
        .create_conversation(NewConversation::new("client", "sink", json!({"n": 0})))
        .await
        .unwrap();
    let id = opened.conversation_id;
    clock.advance(Duration::hours(1));

    manager.store().arm();
    let routing = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .route_message(MessageDraft::new(id, "client", "sink", json!({"n": 1})))
                .await
        })
    };
    // The route holds the lock and is parked inside its append.
    manager.store().appending.notified().await;

    let sweeping = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.sweep_timeouts(Duration::minutes(30)).await })
    };
    // The sweep has seen the stale, idle snapshot.
    manager.store().listed.notified().await;
    manager.store().gate.notify_one();

    let delivery = routing.await.unwrap().unwrap();
    assert_eq!(delivery.message.turn_number, 2);

    let report = sweeping.await.unwrap().unwrap();
    assert_eq!(report.candidates, 1);
    assert_eq!(report.timed_out, 0);
    assert_eq!(report.skipped, 1);

    let state = manager.get_conversation_state(id).await.unwrap();
    assert_eq!(state.status, ConversationStatus::Active);
    assert_eq!(state.turn_count, 2);
}

#[tokio::test]
async fn store_outage_leaves_conversation_untouched() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let manager = manager(FlakyStore::new(InMemoryStore::new()), &clock);
    let opened = manager
        .create_conversation(NewConversation::new("client", "sink", json!({"n": 0})))
        .await
        .unwrap();
    let id = opened.conversation_id;
    let before = manager.get_conversation_state(id).await.unwrap();

    manager.store().fail_writes(true);
    clock.advance(Duration::seconds(5));

    let err = manager
        .route_message(MessageDraft::new(id, "client", "sink", json!({"n": 1})))
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::StoreUnavailable(_)));
    assert!(!err.is_rejection());

    let err = manager
        .end_conversation(id, EndReason::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::StoreUnavailable(_)));

    assert_eq!(manager.get_conversation_state(id).await.unwrap(), before);
    assert_eq!(manager.store().count_messages(&id).await.unwrap(), 1);

    // Recovery picks up at the next turn.
    manager.store().fail_writes(false);
    let delivery = manager
        .route_message(MessageDraft::new(id, "client", "sink", json!({"n": 1})))
        .await
        .unwrap();
    assert_eq!(delivery.message.turn_number, 2);
}

#[tokio::test]
async fn store_outage_on_create_persists_nothing() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let manager = manager(FlakyStore::new(InMemoryStore::new()), &clock);
    manager.store().fail_writes(true);

    let err = manager
        .create_conversation(NewConversation::new("client", "sink", json!({"n": 0})))
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::StoreUnavailable(_)));
    assert!(manager.store().inner.is_empty().await);
}

#[tokio::test]
async fn finished_conversation_locks_are_evicted() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let manager = manager(InMemoryStore::new(), &clock);

    let done = manager
        .create_conversation(NewConversation::new("client", "sink", json!({"n": 0})))
        .await
        .unwrap();
    let open = manager
        .create_conversation(NewConversation::new("client", "sink", json!({"n": 0})))
        .await
        .unwrap();
    manager
        .end_conversation(done.conversation_id, EndReason::Completed)
        .await
        .unwrap();
    assert_eq!(manager.locks().len(), 2);

    clock.advance(Duration::seconds(1));
    let report = manager.sweep_timeouts(Duration::hours(1)).await.unwrap();
    assert_eq!(report.evicted_locks, 1);
    assert!(!manager.locks().contains(&done.conversation_id));
    assert!(manager.locks().contains(&open.conversation_id));

    // A request for a terminal conversation after eviction still gets its answer.
    let status = manager
        .end_conversation(done.conversation_id, EndReason::Completed)
        .await
        .unwrap();
    assert_eq!(status, ConversationStatus::Completed);
}

#[tokio::test]
async fn background_sweeper_times_out_and_stops() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let manager = Arc::new(manager(InMemoryStore::new(), &clock));
    let opened = manager
        .create_conversation(NewConversation::new("client", "sink", json!({"n": 0})))
        .await
        .unwrap();
    clock.advance(Duration::hours(2));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = SweeperConfig {
        interval: std::time::Duration::from_millis(10),
        idle_timeout: Duration::hours(1),
    };
    let handle = Arc::clone(&manager).spawn_sweeper(config, shutdown_rx);

    let mut status = ConversationStatus::Active;
    for _ in 0..200 {
        status = manager
            .get_conversation_state(opened.conversation_id)
            .await
            .unwrap()
            .status;
        if status != ConversationStatus::Active {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(status, ConversationStatus::Timeout);

    shutdown_tx.send(true).unwrap();
    let stats = handle.await.unwrap();
    assert!(stats.cycles >= 1);
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.errors, 0);
}

#[tokio::test]
async fn sweeper_spawned_after_shutdown_never_sweeps() {
    let clock = Arc::new(ManualClock::new(base_time()));
    let manager = Arc::new(manager(InMemoryStore::new(), &clock));
    let opened = manager
        .create_conversation(NewConversation::new("client", "sink", json!({"n": 0})))
        .await
        .unwrap();
    clock.advance(Duration::hours(2));

    let (shutdown_tx, shutdown_rx) = watch::channel(true);
    let config = SweeperConfig {
        interval: std::time::Duration::from_millis(10),
        idle_timeout: Duration::hours(1),
    };
    let handle = Arc::clone(&manager).spawn_sweeper(config, shutdown_rx);

    // The sender stays alive, so only the initial value can stop the task.
    let stats = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    drop(shutdown_tx);
    assert_eq!(stats.cycles, 0);

    let state = manager
        .get_conversation_state(opened.conversation_id)
        .await
        .unwrap();
    assert_eq!(state.status, ConversationStatus::Active);
}
