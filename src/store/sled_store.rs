use async_trait::async_trait;
use sled::Db;

use crate::store::StateStore;
use crate::utils::error::RelayError;

/// Tree holding room -> connection count (big-endian i64).
const ROOM_CONNECTIONS: &str = "room-connections";

/// Tree holding the set of rooms with an active upstream subscription.
const SUBSCRIBED_ROOMS: &str = "subscribed-rooms";

/// Sled-backed state store.
///
/// One tree per logical key family, opened at the call site. Counters are
/// updated with `update_and_fetch`, which is atomic per key.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: &str) -> Result<Self, RelayError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn conn_tree_name(conn_id: &str) -> String {
        format!("rooms:{conn_id}")
    }

    fn decode_count(bytes: &[u8]) -> i64 {
        bytes
            .try_into()
            .map(i64::from_be_bytes)
            .unwrap_or_default()
    }

    fn encode_count(count: i64) -> [u8; 8] {
        count.to_be_bytes()
    }
}

#[async_trait]
impl StateStore for SledStore {
    async fn incr_room_count(&self, room: &str) -> Result<i64, RelayError> {
        let tree = self.db.open_tree(ROOM_CONNECTIONS)?;
        let post = tree.update_and_fetch(room.as_bytes(), |old| {
            let count = old.map(Self::decode_count).unwrap_or(0).saturating_add(1);
            Some(Self::encode_count(count).to_vec())
        })?;
        Ok(post.as_deref().map(Self::decode_count).unwrap_or(0))
    }

    async fn decr_room_count(&self, room: &str) -> Result<i64, RelayError> {
        let tree = self.db.open_tree(ROOM_CONNECTIONS)?;
        let post = tree.update_and_fetch(room.as_bytes(), |old| {
            let count = old.map(Self::decode_count).unwrap_or(0) - 1;
            Some(Self::encode_count(count.max(0)).to_vec())
        })?;
        let count = post.as_deref().map(Self::decode_count).unwrap_or(0);
        if count == 0 {
            // Drop the entry only if nobody re-incremented it in the meantime.
            let zero = Self::encode_count(0);
            let _ = tree.compare_and_swap(room.as_bytes(), Some(&zero[..]), None::<&[u8]>)?;
        }
        Ok(count)
    }

    async fn room_count(&self, room: &str) -> Result<i64, RelayError> {
        let tree = self.db.open_tree(ROOM_CONNECTIONS)?;
        Ok(tree
            .get(room.as_bytes())?
            .as_deref()
            .map(Self::decode_count)
            .unwrap_or(0))
    }

    async fn add_subscribed(&self, room: &str) -> Result<(), RelayError> {
        let tree = self.db.open_tree(SUBSCRIBED_ROOMS)?;
        tree.insert(room.as_bytes(), &[])?;
        Ok(())
    }

    async fn remove_subscribed(&self, room: &str) -> Result<(), RelayError> {
        let tree = self.db.open_tree(SUBSCRIBED_ROOMS)?;
        tree.remove(room.as_bytes())?;
        Ok(())
    }

    async fn subscribed_rooms(&self) -> Result<Vec<String>, RelayError> {
        let tree = self.db.open_tree(SUBSCRIBED_ROOMS)?;
        let mut rooms = Vec::new();
        for entry in tree.iter() {
            let (key, _) = entry?;
            rooms.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(rooms)
    }

    async fn add_connection_room(&self, conn_id: &str, room: &str) -> Result<(), RelayError> {
        let tree = self.db.open_tree(Self::conn_tree_name(conn_id))?;
        tree.insert(room.as_bytes(), &[])?;
        Ok(())
    }

    async fn remove_connection_room(&self, conn_id: &str, room: &str) -> Result<(), RelayError> {
        let tree = self.db.open_tree(Self::conn_tree_name(conn_id))?;
        tree.remove(room.as_bytes())?;
        Ok(())
    }

    async fn connection_rooms(&self, conn_id: &str) -> Result<Vec<String>, RelayError> {
        let tree = self.db.open_tree(Self::conn_tree_name(conn_id))?;
        let mut rooms = Vec::new();
        for entry in tree.iter() {
            let (key, _) = entry?;
            rooms.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(rooms)
    }

    async fn remove_connection(&self, conn_id: &str) -> Result<(), RelayError> {
        self.db.drop_tree(Self::conn_tree_name(conn_id))?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), RelayError> {
        for name in self.db.tree_names() {
            if name.as_ref() == b"__sled__default" {
                continue;
            }
            self.db.drop_tree(name)?;
        }
        Ok(())
    }
}
