use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc::UnboundedReceiver;

use super::Multiplexer;
use crate::bus::memory::MemoryBus;
use crate::bus::message::BusMessage;
use crate::store::StateStore;
use crate::store::memory::MemoryStore;
use crate::utils::backoff::RetryPolicy;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        op_timeout: Duration::from_secs(1),
    }
}

fn setup() -> (
    Arc<Multiplexer>,
    Arc<MemoryStore>,
    Arc<MemoryBus>,
    UnboundedReceiver<BusMessage>,
) {
    let store = Arc::new(MemoryStore::new());
    let (bus, inbound) = MemoryBus::new();
    let bus = Arc::new(bus);
    let mux = Arc::new(Multiplexer::new(
        bus.clone(),
        store.clone(),
        fast_retry(),
    ));
    (mux, store, bus, inbound)
}

#[tokio::test]
async fn ensure_subscribed_is_idempotent() {
    let (mux, store, bus, _inbound) = setup();

    mux.ensure_subscribed("news").await.unwrap();
    mux.ensure_subscribed("news").await.unwrap();

    assert_eq!(bus.subscribe_count("news"), 1);
    assert!(mux.is_subscribed("news").await);
    assert_eq!(
        store.subscribed_rooms().await.unwrap(),
        vec!["news".to_string()]
    );
}

#[tokio::test]
async fn concurrent_ensure_subscribed_yields_one_subscription() {
    let (mux, _store, bus, _inbound) = setup();

    let calls = (0..10).map(|_| {
        let mux = mux.clone();
        async move { mux.ensure_subscribed("news").await }
    });
    for result in join_all(calls).await {
        result.unwrap();
    }

    assert_eq!(bus.subscribe_count("news"), 1);
}

#[tokio::test]
async fn unsubscribe_aborts_while_members_remain() {
    let (mux, store, bus, _inbound) = setup();

    store.incr_room_count("news").await.unwrap();
    mux.ensure_subscribed("news").await.unwrap();

    mux.ensure_unsubscribed("news").await.unwrap();

    assert!(mux.is_subscribed("news").await);
    assert!(bus.is_subscribed("news"));
    assert_eq!(bus.unsubscribe_count("news"), 0);
    assert_eq!(
        store.subscribed_rooms().await.unwrap(),
        vec!["news".to_string()]
    );
}

#[tokio::test]
async fn unsubscribe_tears_down_empty_room() {
    let (mux, store, bus, _inbound) = setup();

    mux.ensure_subscribed("news").await.unwrap();
    mux.ensure_unsubscribed("news").await.unwrap();

    assert!(!mux.is_subscribed("news").await);
    assert!(!bus.is_subscribed("news"));
    assert_eq!(bus.unsubscribe_count("news"), 1);
    assert!(store.subscribed_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn unsubscribe_of_unknown_room_is_a_noop() {
    let (mux, _store, bus, _inbound) = setup();

    mux.ensure_unsubscribed("never-seen").await.unwrap();
    assert_eq!(bus.unsubscribe_count("never-seen"), 0);
}

#[tokio::test]
async fn reconcile_repairs_degraded_subscription() {
    let (mux, store, bus, _inbound) = setup();

    // A room with members but no subscription, as after a failed subscribe.
    store.incr_room_count("news").await.unwrap();
    assert!(!bus.is_subscribed("news"));

    mux.reconcile(&["news".to_string()]).await.unwrap();

    assert!(bus.is_subscribed("news"));
    assert_eq!(bus.subscribe_count("news"), 1);
}

#[tokio::test]
async fn reconcile_clears_stale_subscribed_entries() {
    let (mux, store, bus, _inbound) = setup();

    // Left behind by a previous process: in the store set, count zero,
    // no subscription held by this process.
    store.add_subscribed("ghost").await.unwrap();

    mux.reconcile(&[]).await.unwrap();

    assert!(store.subscribed_rooms().await.unwrap().is_empty());
    assert_eq!(bus.unsubscribe_count("ghost"), 0);
}

#[tokio::test]
async fn reconcile_removes_subscription_for_emptied_room() {
    let (mux, store, bus, _inbound) = setup();

    store.incr_room_count("news").await.unwrap();
    mux.ensure_subscribed("news").await.unwrap();
    store.decr_room_count("news").await.unwrap();

    mux.reconcile(&[]).await.unwrap();

    assert!(!bus.is_subscribed("news"));
    assert!(store.subscribed_rooms().await.unwrap().is_empty());
}

#[tokio::test]
async fn subscribe_failure_surfaces_after_retries() {
    let (mux, store, bus, _inbound) = setup();
    bus.set_reject_subscribes(true);

    let result = mux.ensure_subscribed("news").await;

    assert!(result.is_err());
    assert!(!mux.is_subscribed("news").await);
    assert!(store.subscribed_rooms().await.unwrap().is_empty());

    // Once the bus recovers, the same call succeeds.
    bus.set_reject_subscribes(false);
    mux.ensure_subscribed("news").await.unwrap();
    assert!(bus.is_subscribed("news"));
}
