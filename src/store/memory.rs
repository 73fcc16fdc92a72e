use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};

use crate::store::StateStore;
use crate::utils::error::RelayError;

/// In-memory state store for tests. Same single-key atomicity guarantees as
/// the sled implementation.
#[derive(Default)]
pub struct MemoryStore {
    counts: DashMap<String, i64>,
    subscribed: DashSet<String>,
    connection_rooms: DashMap<String, HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn incr_room_count(&self, room: &str) -> Result<i64, RelayError> {
        let mut entry = self.counts.entry(room.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }

    async fn decr_room_count(&self, room: &str) -> Result<i64, RelayError> {
        let count = match self.counts.get_mut(room) {
            Some(mut entry) => {
                *entry = (*entry - 1).max(0);
                *entry
            }
            None => 0,
        };
        if count == 0 {
            self.counts.remove_if(room, |_, value| *value == 0);
        }
        Ok(count)
    }

    async fn room_count(&self, room: &str) -> Result<i64, RelayError> {
        Ok(self.counts.get(room).map(|entry| *entry).unwrap_or(0))
    }

    async fn add_subscribed(&self, room: &str) -> Result<(), RelayError> {
        self.subscribed.insert(room.to_string());
        Ok(())
    }

    async fn remove_subscribed(&self, room: &str) -> Result<(), RelayError> {
        self.subscribed.remove(room);
        Ok(())
    }

    async fn subscribed_rooms(&self) -> Result<Vec<String>, RelayError> {
        Ok(self.subscribed.iter().map(|room| room.key().clone()).collect())
    }

    async fn add_connection_room(&self, conn_id: &str, room: &str) -> Result<(), RelayError> {
        self.connection_rooms
            .entry(conn_id.to_string())
            .or_default()
            .insert(room.to_string());
        Ok(())
    }

    async fn remove_connection_room(&self, conn_id: &str, room: &str) -> Result<(), RelayError> {
        if let Some(mut rooms) = self.connection_rooms.get_mut(conn_id) {
            rooms.remove(room);
        }
        Ok(())
    }

    async fn connection_rooms(&self, conn_id: &str) -> Result<Vec<String>, RelayError> {
        Ok(self
            .connection_rooms
            .get(conn_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn remove_connection(&self, conn_id: &str) -> Result<(), RelayError> {
        self.connection_rooms.remove(conn_id);
        Ok(())
    }

    async fn clear(&self) -> Result<(), RelayError> {
        self.counts.clear();
        self.subscribed.clear();
        self.connection_rooms.clear();
        Ok(())
    }
}
