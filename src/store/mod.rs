//! The `store` module is the shared state store adapter.
//!
//! The relay keeps its cross-connection bookkeeping in an external key/value
//! and set store: per-room connection counts, the set of rooms currently
//! subscribed on the upstream bus, and each connection's joined-room set
//! (so cleanup can run even after local state is lost).
//!
//! Every operation is atomic at single-key granularity; the relay never
//! needs cross-key transactions. The default implementation uses `sled` as
//! an embedded store; the trait is the seam where a shared network store
//! would slot in for a multi-instance deployment.

pub mod sled_store;

#[cfg(test)]
pub mod memory;


use async_trait::async_trait;

use crate::utils::error::RelayError;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Atomically increment the room's connection count, returning the
    /// post-increment value.
    async fn incr_room_count(&self, room: &str) -> Result<i64, RelayError>;

    /// Atomically decrement the room's connection count, returning the
    /// post-decrement value. Saturates at 0 so duplicate disconnect events
    /// can never drive a count negative.
    async fn decr_room_count(&self, room: &str) -> Result<i64, RelayError>;

    async fn room_count(&self, room: &str) -> Result<i64, RelayError>;

    async fn add_subscribed(&self, room: &str) -> Result<(), RelayError>;

    async fn remove_subscribed(&self, room: &str) -> Result<(), RelayError>;

    async fn subscribed_rooms(&self) -> Result<Vec<String>, RelayError>;

    async fn add_connection_room(&self, conn_id: &str, room: &str) -> Result<(), RelayError>;

    async fn remove_connection_room(&self, conn_id: &str, room: &str) -> Result<(), RelayError>;

    async fn connection_rooms(&self, conn_id: &str) -> Result<Vec<String>, RelayError>;

    /// Discard the connection's room-set record.
    async fn remove_connection(&self, conn_id: &str) -> Result<(), RelayError>;

    /// Wipe all relay-owned keys. Run at startup: counts are rebuilt from
    /// live connections, so state from a previous process must not survive.
    async fn clear(&self) -> Result<(), RelayError>;
}
