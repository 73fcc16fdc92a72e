//! Room subscription multiplexer.
//!
//! Subscribe/unsubscribe decisions for a room are serialized through that
//! room's mutex: checking the current state and acting on it happen as one
//! indivisible step, so concurrent joins produce exactly one bus
//! subscription and a decrement-to-zero teardown can never strand a room
//! that a concurrent join has just repopulated. Calls for distinct rooms
//! never block each other.
//!
//! This relay runs single-instance, so the critical section is a local
//! lock; the store trait is where a distributed lock would attach for a
//! multi-process deployment.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::bus::Bus;
use crate::bus::message::BusMessage;
use crate::gateway::Gateway;
use crate::store::StateStore;
use crate::utils::backoff::{RetryPolicy, retry_with_backoff};
use crate::utils::error::RelayError;

#[derive(Debug, Default)]
struct RoomSub {
    subscribed: bool,
}

pub struct Multiplexer {
    bus: Arc<dyn Bus>,
    store: Arc<dyn StateStore>,
    rooms: DashMap<String, Arc<Mutex<RoomSub>>>,
    retry: RetryPolicy,
}

impl Multiplexer {
    pub fn new(bus: Arc<dyn Bus>, store: Arc<dyn StateStore>, retry: RetryPolicy) -> Self {
        Self {
            bus,
            store,
            rooms: DashMap::new(),
            retry,
        }
    }

    fn room_state(&self, room: &str) -> Arc<Mutex<RoomSub>> {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Establish the bus subscription for `room` unless it already exists.
    /// Safe to call concurrently for the same room: callers serialize on the
    /// room's mutex and only the first one through performs the subscribe.
    pub async fn ensure_subscribed(&self, room: &str) -> Result<(), RelayError> {
        let state = self.room_state(room);
        let mut state = state.lock().await;
        if state.subscribed {
            return Ok(());
        }

        retry_with_backoff(&self.retry, "bus subscribe", || self.bus.subscribe(room)).await?;
        self.store.add_subscribed(room).await?;
        state.subscribed = true;
        info!("subscribed to room {room} on the upstream bus");
        Ok(())
    }

    /// Tear down the bus subscription for `room` if its connection count has
    /// reached zero. The count is re-checked inside the critical section: a
    /// join that raced in aborts the teardown, leaving the subscription
    /// intact for the new member.
    pub async fn ensure_unsubscribed(&self, room: &str) -> Result<(), RelayError> {
        let state = self.room_state(room);
        let mut state = state.lock().await;

        let count = self.store.room_count(room).await?;
        if count > 0 {
            debug!("unsubscribe of {room} aborted: {count} connection(s) remain");
            return Ok(());
        }

        if state.subscribed {
            retry_with_backoff(&self.retry, "bus unsubscribe", || {
                self.bus.unsubscribe(room)
            })
            .await?;
            state.subscribed = false;
            info!("unsubscribed from room {room} on the upstream bus");
        }
        // Also clears entries left behind by a previous process.
        self.store.remove_subscribed(room).await?;
        Ok(())
    }

    /// Local view of the subscription state, used by the reconciler and
    /// tests.
    pub async fn is_subscribed(&self, room: &str) -> bool {
        match self.rooms.get(room) {
            Some(entry) => {
                let state = entry.value().clone();
                drop(entry);
                state.lock().await.subscribed
            }
            None => false,
        }
    }

    /// Repair drift between membership counts and subscription state:
    /// rooms with members but no subscription are resubscribed (degraded
    /// service recovery), and subscribed rooms whose count reached zero are
    /// torn down (leak recovery).
    pub async fn reconcile(&self, active_rooms: &[String]) -> Result<(), RelayError> {
        for room in active_rooms {
            if self.store.room_count(room).await? > 0 {
                if let Err(e) = self.ensure_subscribed(room).await {
                    warn!("reconcile: resubscribe of {room} failed: {e}");
                }
            }
        }

        for room in self.store.subscribed_rooms().await? {
            if self.store.room_count(&room).await? <= 0 {
                if let Err(e) = self.ensure_unsubscribed(&room).await {
                    warn!("reconcile: unsubscribe of {room} failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// Forward inbound bus messages to the gateway's fan-out path. Runs
    /// until the bus closes the channel.
    pub async fn run_delivery(gateway: Arc<Gateway>, mut inbound: UnboundedReceiver<BusMessage>) {
        while let Some(message) = inbound.recv().await {
            gateway.deliver(&message.topic, &message.payload);
        }
        debug!("bus inbound channel closed; delivery pump stopping");
    }

    /// Periodic reconciliation sweep, run as a background task.
    pub async fn start_reconcile_loop(mux: Arc<Multiplexer>, gateway: Arc<Gateway>, every: Duration) {
        loop {
            tokio::time::sleep(every).await;
            let active = gateway.local_rooms();
            if let Err(e) = mux.reconcile(&active).await {
                warn!("reconcile sweep failed: {e}");
            }
        }
    }
}
