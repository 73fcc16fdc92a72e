use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::bus::Bus;
use crate::bus::message::BusMessage;
use crate::utils::error::RelayError;

/// In-memory bus for tests. Tracks how many times each room was subscribed
/// (the no-double-subscribe property) and only delivers publishes for rooms
/// with an active subscription, like a real broker.
pub struct MemoryBus {
    subscribed: DashSet<String>,
    subscribe_calls: DashMap<String, usize>,
    unsubscribe_calls: DashMap<String, usize>,
    reject_subscribes: AtomicBool,
    inbound_tx: UnboundedSender<BusMessage>,
}

impl MemoryBus {
    pub fn new() -> (Self, UnboundedReceiver<BusMessage>) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Self {
                subscribed: DashSet::new(),
                subscribe_calls: DashMap::new(),
                unsubscribe_calls: DashMap::new(),
                reject_subscribes: AtomicBool::new(false),
                inbound_tx,
            },
            inbound_rx,
        )
    }

    pub fn is_subscribed(&self, room: &str) -> bool {
        self.subscribed.contains(room)
    }

    pub fn subscribe_count(&self, room: &str) -> usize {
        self.subscribe_calls.get(room).map(|c| *c).unwrap_or(0)
    }

    pub fn unsubscribe_count(&self, room: &str) -> usize {
        self.unsubscribe_calls.get(room).map(|c| *c).unwrap_or(0)
    }

    /// Make subsequent subscribe calls fail, simulating a bus outage.
    pub fn set_reject_subscribes(&self, reject: bool) {
        self.reject_subscribes.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn subscribe(&self, room: &str) -> Result<(), RelayError> {
        if self.reject_subscribes.load(Ordering::SeqCst) {
            return Err(RelayError::Bus("subscribe rejected".into()));
        }
        *self.subscribe_calls.entry(room.to_string()).or_insert(0) += 1;
        self.subscribed.insert(room.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, room: &str) -> Result<(), RelayError> {
        *self.unsubscribe_calls.entry(room.to_string()).or_insert(0) += 1;
        self.subscribed.remove(room);
        Ok(())
    }

    async fn publish(&self, room: &str, payload: &str) -> Result<(), RelayError> {
        if self.subscribed.contains(room) {
            let _ = self.inbound_tx.send(BusMessage {
                topic: room.to_string(),
                payload: payload.to_string(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
        Ok(())
    }
}
