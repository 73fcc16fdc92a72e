//! Local room membership
//!
//! A `Room` holds the connection ids currently joined to a room on this
//! relay instance. It is the fan-out index only; the cross-instance
//! connection count lives in the shared state store.
//!
//! Concurrency note: callers must synchronize access to `Room` (the gateway
//! holds rooms inside a concurrent map entry) when modifying membership.

use std::collections::HashSet;

use crate::connection::ConnectionId;

#[derive(Debug, Default)]
pub struct Room {
    pub name: String,
    pub members: HashSet<ConnectionId>,
}

impl Room {
    /// Create a new room with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            members: HashSet::new(),
        }
    }

    /// Add a member to the room. Duplicate adds are ignored.
    pub fn join(&mut self, id: ConnectionId) {
        self.members.insert(id);
    }

    /// Remove a member from the room.
    pub fn leave(&mut self, id: &ConnectionId) {
        self.members.remove(id);
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
