//! The `bus` module is the client side of the upstream message bus.
//!
//! The relay holds one logical bus subscription per room with live members,
//! shared by every connection in that room. The bus speaks a small JSON
//! protocol over WebSocket (subscribe/unsubscribe/publish commands in, topic
//! messages out); inbound messages are bridged onto an mpsc channel so the
//! transport never blocks the fan-out path.

pub mod message;
pub mod ws_bus;

#[cfg(test)]
pub mod memory;


use async_trait::async_trait;

use crate::utils::error::RelayError;

#[async_trait]
pub trait Bus: Send + Sync {
    /// Establish the upstream subscription for `room`. Messages published to
    /// the room afterwards arrive on the inbound channel handed out at
    /// construction time.
    async fn subscribe(&self, room: &str) -> Result<(), RelayError>;

    /// Tear down the upstream subscription for `room`.
    async fn unsubscribe(&self, room: &str) -> Result<(), RelayError>;

    /// Publish a payload to a room. The relay core never publishes; this is
    /// here for collaborators and tests.
    async fn publish(&self, room: &str, payload: &str) -> Result<(), RelayError>;
}
