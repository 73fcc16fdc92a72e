use serde::{Deserialize, Serialize};

/// Command frames sent to the upstream bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BusCommand {
    #[serde(rename = "subscribe")]
    Subscribe { topic: String },

    #[serde(rename = "unsubscribe")]
    Unsubscribe { topic: String },

    #[serde(rename = "publish")]
    Publish {
        topic: String,
        payload: String,
        timestamp: i64,
    },
}

/// A message delivered by the upstream bus for a subscribed room.
///
/// `topic` is the room name on the bus; `payload` is an opaque blob produced
/// by an external publisher and is forwarded to clients unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
    pub timestamp: i64,
}
