//! End-to-end tests for the notification inbox
//!
//! Drives a full engine (recording view, in-memory backend) through the
//! snapshot, stream, counts and pagination channels and the user actions.

mod common;

use common::*;
use notification_inbox::inbox::{
    driver, InboundEvent, InboxEvent, LoadMoreState, PageOutcome, Position, ReadOutcome,
    UserAction, ViewEffect,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn assert_ordered_and_unique(inbox: &TestInbox) {
    let records = inbox.engine.cache().records();
    assert!(
        records.windows(2).all(|w| w[0].order_at >= w[1].order_at),
        "out of order: {:?}",
        ids(&inbox.engine)
    );
    let unique: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(unique.len(), records.len());
}

#[test]
fn test_stream_insert_into_seeded_window() {
    let mut inbox = TestInbox::without_backend();
    inbox.engine.ingest_initial(seed_window());
    inbox.view.take();

    inbox
        .engine
        .ingest_event(InboundEvent::insert(record("late", 990_500)))
        .unwrap();

    assert_eq!(
        inbox.view.take(),
        vec![ViewEffect::Insert {
            id: "late".to_string(),
            position: Position::Middle(10)
        }]
    );
    assert_eq!(inbox.engine.cache().len(), SEED_COUNT + 1);
    let orders: Vec<i64> = inbox.engine.cache().iter().map(|r| r.order_at).collect();
    assert!(orders.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn test_mark_as_read_sends_only_cached_ids() {
    // The backend already knows "a" is read; the cache does not
    let mut server_a = record("a", 300);
    server_a.read_status = true;
    let mut inbox = TestInbox::with_archive(
        vec![server_a, record("b", 200), record("c", 100)],
        vec![record("a", 300), record("b", 200), record("c", 100)],
    );

    let outcome = inbox.engine.mark_as_read(&["b", "z"]).await.unwrap();

    assert_eq!(
        outcome,
        ReadOutcome::Marked {
            ids: vec!["b".to_string()],
            unread_count: 1
        }
    );
    assert_eq!(inbox.backend().marked_ids().await, vec!["b".to_string()]);
    assert_eq!(inbox.engine.unread_count(), 1);

    let cache = inbox.engine.cache();
    assert!(cache.get("a").unwrap().is_unread());
    assert!(!cache.get("b").unwrap().is_unread());
    assert!(cache.get("c").unwrap().is_unread());
}

#[tokio::test]
async fn test_mark_as_read_with_only_unknown_ids_skips_backend() {
    let mut inbox = TestInbox::with_backend(vec![record("a", 300)]);
    inbox.engine.ingest_count(1);
    inbox.view.take();

    let outcome = inbox.engine.mark_as_read(&["x", "y", ""]).await.unwrap();

    assert_eq!(outcome, ReadOutcome::NothingToMark);
    assert_eq!(inbox.backend().calls().mark_as_read, 0);
    assert_eq!(inbox.engine.unread_count(), 1);
    assert!(inbox.view.take().is_empty());
}

#[tokio::test]
async fn test_empty_page_retires_load_more_for_the_session() {
    let mut inbox = TestInbox::with_backend(seed_window());
    assert_eq!(inbox.engine.load_more_state(), LoadMoreState::Available);

    assert_eq!(
        inbox.engine.load_older().await.unwrap(),
        PageOutcome::ReachedEnd
    );
    assert_eq!(inbox.engine.load_more_state(), LoadMoreState::Exhausted);

    // Even with older data appearing later, paging stays retired
    inbox.backend().add(record("backfilled", 5)).await;
    inbox
        .engine
        .ingest_event(InboundEvent::insert(record("older-looking", 10)))
        .unwrap();
    inbox.engine.handle_action(UserAction::LoadMore).await;

    assert_eq!(inbox.backend().calls().poll, 1);
    assert!(!inbox.engine.can_load_more());
    assert!(!inbox.engine.cache().contains("backfilled"));
}

#[test]
fn test_empty_snapshot_then_zero_count() {
    let mut inbox = TestInbox::without_backend();

    inbox.engine.ingest_initial(vec![]);
    inbox.engine.ingest_count(0);

    assert_eq!(
        inbox.view.take(),
        vec![
            ViewEffect::EmptyState,
            ViewEffect::UnreadIndicator { count: 0 }
        ]
    );
    assert!(inbox.engine.cache().is_empty());
    assert_eq!(inbox.engine.unread_count(), 0);
    assert_eq!(inbox.engine.load_more_state(), LoadMoreState::Hidden);
}

#[test]
fn test_first_batch_deletes_never_change_the_cache() {
    let mut inbox = TestInbox::without_backend();
    inbox.engine.ingest_initial(seed_window());

    for i in 0..SEED_COUNT {
        let id = format!("n{}", i);
        inbox
            .engine
            .ingest_event(InboundEvent::first_batch_delete(record(&id, 0)))
            .unwrap();
    }

    assert_eq!(inbox.engine.cache().len(), SEED_COUNT);
}

#[tokio::test]
async fn test_load_older_is_single_flight() {
    let mut inbox = TestInbox::with_backend(seed_window());
    inbox.backend().set_polling(true);

    let first = inbox.engine.load_older().await.unwrap();
    let second = inbox.engine.load_older().await.unwrap();

    assert_eq!(first, PageOutcome::InFlight);
    assert_eq!(second, PageOutcome::InFlight);
    assert_eq!(inbox.backend().calls().poll, 0);
    assert_eq!(inbox.engine.load_more_state(), LoadMoreState::Available);
}

#[tokio::test]
async fn test_pagination_walks_archive_by_created_at() {
    // 45 notifications, first page of 20; one of them was bumped to the top
    let mut archive: Vec<_> = (0..45)
        .map(|i| record(&format!("n{}", i), 100_000 - i * 100))
        .collect();
    archive[19] = bumped_record("n19", 100_000 - 19 * 100, 200_000);
    let first_page = archive[..20].to_vec();
    let mut inbox = TestInbox::with_archive(archive, first_page);

    assert_eq!(ids(&inbox.engine)[0], "n19");

    let mut loaded = Vec::new();
    loop {
        match inbox.engine.load_older().await.unwrap() {
            PageOutcome::Loaded { merged, rejected } => {
                assert_eq!(rejected, 0);
                loaded.push(merged);
            }
            PageOutcome::ReachedEnd => break,
            other => panic!("Unexpected outcome {:?}", other),
        }
    }

    assert_eq!(loaded, vec![20, 5]);
    assert_eq!(inbox.engine.cache().len(), 45);
    assert_eq!(inbox.backend().calls().poll, 3);
    assert_ordered_and_unique(&inbox);
}

#[tokio::test]
async fn test_read_all_marks_everything_and_zeroes_indicator() {
    let mut inbox = TestInbox::with_backend(vec![record("a", 300), record("b", 200)]);
    inbox.engine.ingest_count(2);
    inbox.view.take();

    inbox.engine.handle_action(UserAction::ReadAll).await;

    assert!(inbox.engine.cache().iter().all(|r| r.read_status));
    assert_eq!(inbox.engine.unread_count(), 0);
    assert_eq!(inbox.backend().unread_count().await, 0);

    let effects = inbox.view.take();
    assert_eq!(
        effects[0],
        ViewEffect::Metric {
            category: CATEGORY.to_string(),
            action: "notification_read_all".to_string(),
            value: None
        }
    );
    assert_eq!(
        effects.last(),
        Some(&ViewEffect::UnreadIndicator { count: 0 })
    );
}

#[test]
fn test_random_stream_keeps_invariants() {
    let mut rng = StdRng::seed_from_u64(20);
    let mut inbox = TestInbox::without_backend();
    inbox.engine.ingest_initial(seed_window());

    for _ in 0..2_000 {
        let id = format!("n{}", rng.random_range(0..40));
        let at = SEED_NEWEST_AT - rng.random_range(0..50) * SEED_STEP / 2;
        let event = match rng.random_range(0..4) {
            0 | 1 => InboundEvent::insert(record(&id, at)),
            2 => InboundEvent::update(record(&id, at)),
            _ => InboundEvent::delete(record(&id, at)),
        };
        inbox.engine.ingest_event(event).unwrap();
        assert_ordered_and_unique(&inbox);
    }
}

#[tokio::test]
async fn test_driver_runs_a_whole_session() {
    let inbox = TestInbox::without_backend();
    let backend = std::sync::Arc::new(notification_inbox::inbox::InMemoryBackend::new(vec![
        record("a", 300),
        record("b", 200),
    ]));
    let (tx, handle) = driver::spawn(inbox.engine, 16);

    tx.send(InboxEvent::BackendReady(backend.clone()))
        .await
        .unwrap();
    tx.send(InboxEvent::FirstResponse(Ok(vec![record("a", 300), record("b", 200)])))
        .await
        .unwrap();
    tx.send(InboxEvent::CountsUpdated { unread_count: 2 })
        .await
        .unwrap();
    tx.send(InboxEvent::Stream(InboundEvent::insert(record("c", 400))))
        .await
        .unwrap();
    tx.send(InboxEvent::Action(UserAction::Open {
        id: "a".to_string(),
    }))
    .await
    .unwrap();
    drop(tx);

    let engine = handle.await.unwrap();

    let snapshot = engine.snapshot();
    let order: Vec<&str> = snapshot
        .notifications
        .iter()
        .map(|r| r.id.as_str())
        .collect();
    assert_eq!(order, vec!["c", "a", "b"]);
    assert!(snapshot.notifications[1].read_status);
    // Backend only knows a and b; b is still unread there
    assert_eq!(snapshot.unread_count, 1);
    assert_eq!(backend.marked_ids().await, vec!["a".to_string()]);
}
