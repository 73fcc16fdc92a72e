//! The `mux` module is the room subscription multiplexer.
//!
//! It owns the mapping from room to upstream-subscription state and decides
//! when to subscribe and unsubscribe based on the connection counts in the
//! shared state store, so that any number of local connections share a
//! single bus subscription per room.

pub mod multiplexer;
pub use multiplexer::Multiplexer;

#[cfg(test)]
mod tests;
