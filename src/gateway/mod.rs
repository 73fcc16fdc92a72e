//! The `gateway` module owns live client connections.
//!
//! It tracks, per connection, the set of rooms joined; on join, leave, and
//! disconnect it updates the shared state store and asks the multiplexer to
//! re-evaluate the room's subscription state; on inbound bus messages it
//! fans out to every locally-held connection in the room.

pub mod engine;
pub mod room;

pub use engine::Gateway;
pub use room::Room;
