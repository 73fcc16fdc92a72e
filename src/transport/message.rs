use serde::{Deserialize, Serialize};

/// Frames sent by clients. Room names are opaque non-empty strings;
/// validation beyond that happens before a request reaches the relay.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join")]
    Join { room: String },

    #[serde(rename = "leave")]
    Leave { room: String },
}

/// Frames sent to clients.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// A payload published to a room the client has joined. The payload is
    /// forwarded from the bus unchanged.
    #[serde(rename = "room-update")]
    Update {
        room: String,
        payload: String,
        timestamp: i64,
    },

    /// A join or leave the relay could not complete.
    #[serde(rename = "error")]
    Error { message: String },
}
