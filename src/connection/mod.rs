//! The `connection` module defines the representation of a client connection
//! in the relay.
//!
//! It provides the `Connection` struct, which encapsulates the state the
//! gateway owns for a single network link: its unique identifier, the channel
//! for sending messages to it, and the set of rooms it has joined.

pub mod connection;
pub use connection::{Connection, ConnectionId};
