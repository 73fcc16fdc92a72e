//! The `transport` module is responsible for handling network communication
//! with clients, primarily via WebSockets.
//!
//! It defines the messaging protocol used between clients and the relay,
//! and implements the WebSocket server itself, managing connections,
//! message parsing, and forwarding join/leave requests to the gateway.

pub mod message;
pub mod websocket;
