//! The `error` module defines the error type used within the `roomcast`
//! application.
//!
//! Errors are split along the relay's failure taxonomy: state store failures,
//! upstream bus failures, per-attempt timeouts, and transport/codec problems.
//! A guard-aborted unsubscribe is not an error and never surfaces here.

use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("store operation failed: {0}")]
    Store(String),

    #[error("bus unavailable: {0}")]
    Bus(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown connection: {0}")]
    UnknownConnection(String),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sled::Error> for RelayError {
    fn from(err: sled::Error) -> Self {
        RelayError::Store(err.to_string())
    }
}
