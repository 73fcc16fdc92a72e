use std::collections::HashSet;

use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;
use tungstenite::protocol::Message as WsMessage;

pub type ConnectionId = String;

/// A connected WebSocket client, owned by the gateway for the lifetime of
/// the network link.
///
/// The joined-room set sits behind a mutex: join, leave, and disconnect for
/// one connection must never run concurrently, or an in-flight join could
/// race its own cleanup and leak a membership count.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for the connection.
    pub id: ConnectionId,

    /// Channel to send WebSocket messages to the client.
    pub sender: UnboundedSender<WsMessage>,

    /// Rooms this connection has joined, as known locally.
    pub rooms: Mutex<HashSet<String>>,
}

impl Connection {
    pub fn new(sender: UnboundedSender<WsMessage>) -> Self {
        Self {
            id: format!("conn-{}", uuid::Uuid::new_v4()),
            sender,
            rooms: Mutex::new(HashSet::new()),
        }
    }
}
