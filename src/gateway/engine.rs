//! Connection gateway
//!
//! This module contains the gateway implementation responsible for:
//! - registering connections and tracking which rooms each one has joined
//! - updating the shared state store on join/leave/disconnect and driving
//!   the multiplexer's subscribe/unsubscribe decisions
//! - fanning inbound bus messages out to the room's local connections
//!
//! Concurrency and usage notes:
//! - Join, leave, and disconnect for one connection serialize on that
//!   connection's mutex; operations on distinct connections run freely in
//!   parallel.
//! - Local bookkeeping is only updated after the store update succeeds, so
//!   local state never claims a membership the store doesn't have.
//! - Fan-out reads a snapshot of the room's member set and never blocks on
//!   join/leave mutations for other connections.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::connection::{Connection, ConnectionId};
use crate::gateway::room::Room;
use crate::mux::Multiplexer;
use crate::store::StateStore;
use crate::transport::message::ServerMessage;
use crate::utils::backoff::{RetryPolicy, retry_with_backoff};
use crate::utils::error::RelayError;

pub struct Gateway {
    store: Arc<dyn StateStore>,
    mux: Arc<Multiplexer>,
    connections: DashMap<ConnectionId, Arc<Connection>>,
    rooms: DashMap<String, Room>,
    retry: RetryPolicy,
}

impl Gateway {
    pub fn new(store: Arc<dyn StateStore>, mux: Arc<Multiplexer>, retry: RetryPolicy) -> Self {
        Self {
            store,
            mux,
            connections: DashMap::new(),
            rooms: DashMap::new(),
            retry,
        }
    }

    /// Register a new connection. No side effects beyond allocation.
    pub fn register(&self, connection: Connection) -> ConnectionId {
        let id = connection.id.clone();
        self.connections.insert(id.clone(), Arc::new(connection));
        id
    }

    fn connection(&self, conn_id: &str) -> Result<Arc<Connection>, RelayError> {
        self.connections
            .get(conn_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RelayError::UnknownConnection(conn_id.to_string()))
    }

    /// Join `conn_id` to `room`. Idempotent: a second join for an
    /// already-joined room is a no-op and does not touch the count.
    ///
    /// The store increment happens first and its failure is returned to the
    /// caller with no local bookkeeping done. A failed bus subscription,
    /// by contrast, leaves the client joined: that room is degraded until
    /// the reconciler repairs it.
    pub async fn join(&self, conn_id: &str, room: &str) -> Result<(), RelayError> {
        let connection = self.connection(conn_id)?;
        let mut joined = connection.rooms.lock().await;
        if joined.contains(room) {
            return Ok(());
        }

        let count = retry_with_backoff(&self.retry, "room count increment", || {
            self.store.incr_room_count(room)
        })
        .await?;

        if let Err(e) = retry_with_backoff(&self.retry, "connection room-set add", || {
            self.store.add_connection_room(conn_id, room)
        })
        .await
        {
            // Undo the increment so the count never exceeds live membership.
            if let Err(rollback) = self.store.decr_room_count(room).await {
                warn!("rollback of {room} count failed: {rollback}");
            }
            return Err(e);
        }

        joined.insert(room.to_string());
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| Room::new(room))
            .join(conn_id.to_string());
        drop(joined);
        debug!("{conn_id} joined {room} (count {count})");

        if let Err(e) = self.mux.ensure_subscribed(room).await {
            warn!("bus subscription for {room} failed, delivery degraded until reconcile: {e}");
        }
        Ok(())
    }

    /// Leave `room`. A no-op if the connection never joined it.
    pub async fn leave(&self, conn_id: &str, room: &str) -> Result<(), RelayError> {
        let connection = self.connection(conn_id)?;
        let mut joined = connection.rooms.lock().await;
        if !joined.contains(room) {
            return Ok(());
        }
        self.leave_room(conn_id, room, &mut joined).await
    }

    /// Shared leave path. Caller holds the connection's room-set lock.
    async fn leave_room(
        &self,
        conn_id: &str,
        room: &str,
        joined: &mut HashSet<String>,
    ) -> Result<(), RelayError> {
        let remaining = retry_with_backoff(&self.retry, "room count decrement", || {
            self.store.decr_room_count(room)
        })
        .await?;

        if let Err(e) = retry_with_backoff(&self.retry, "connection room-set remove", || {
            self.store.remove_connection_room(conn_id, room)
        })
        .await
        {
            warn!("room-set removal of {room} for {conn_id} failed: {e}");
        }

        joined.remove(room);
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.leave(&conn_id.to_string());
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
        debug!("{conn_id} left {room} (count {remaining})");

        if remaining <= 0 {
            if let Err(e) = self.mux.ensure_unsubscribed(room).await {
                warn!("unsubscribe of {room} failed, reconciler will retry: {e}");
            }
        }
        Ok(())
    }

    /// Tear down a connection: leave every room it had joined, then discard
    /// its room-set record and the connection itself.
    ///
    /// Cleanup of one room is isolated from the others: a failure is logged
    /// and the remaining rooms are still cleaned up.
    pub async fn on_disconnect(&self, conn_id: &str) -> Result<(), RelayError> {
        let Ok(connection) = self.connection(conn_id) else {
            return Ok(());
        };
        let mut joined = connection.rooms.lock().await;

        // Union of local and stored rooms: the stored set is authoritative
        // if local state was lost part-way.
        let mut rooms: HashSet<String> = joined.clone();
        match self.store.connection_rooms(conn_id).await {
            Ok(stored) => rooms.extend(stored),
            Err(e) => warn!("could not read stored rooms for {conn_id}: {e}"),
        }

        let mut failures = 0usize;
        for room in &rooms {
            if let Err(e) = self.leave_room(conn_id, room, &mut joined).await {
                failures += 1;
                warn!("cleanup of {room} for {conn_id} failed: {e}");
            }
        }

        if let Err(e) = self.store.remove_connection(conn_id).await {
            warn!("room-set record removal for {conn_id} failed: {e}");
        }
        drop(joined);
        self.connections.remove(conn_id);

        if failures > 0 {
            warn!("{conn_id} removed with {failures} failed room cleanup(s)");
        } else {
            debug!("{conn_id} removed");
        }
        Ok(())
    }

    /// Fan a bus message out to every local connection in `room`.
    ///
    /// Best-effort: a failed send is skipped and schedules disconnect
    /// cleanup for that connection, it never blocks delivery to the rest.
    pub fn deliver(self: &Arc<Self>, room: &str, payload: &str) {
        let members: Vec<ConnectionId> = match self.rooms.get(room) {
            Some(entry) => entry.members.iter().cloned().collect(),
            None => return,
        };

        let frame = ServerMessage::Update {
            room: room.to_string(),
            payload: payload.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to serialize room update for {room}: {e}");
                return;
            }
        };

        for conn_id in members {
            let Some(connection) = self
                .connections
                .get(&conn_id)
                .map(|entry| entry.value().clone())
            else {
                // Fully removed since the snapshot was taken.
                continue;
            };
            if connection.sender.send(WsMessage::text(text.clone())).is_err() {
                warn!("delivery to {conn_id} failed; scheduling cleanup");
                let gateway = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = gateway.on_disconnect(&conn_id).await {
                        warn!("cleanup of {conn_id} after failed delivery: {e}");
                    }
                });
            }
        }
    }

    /// Send a frame to a single connection, e.g. an error report for a
    /// failed join.
    pub fn send_to(&self, conn_id: &str, frame: &ServerMessage) {
        let Ok(connection) = self.connection(conn_id) else {
            return;
        };
        match serde_json::to_string(frame) {
            Ok(text) => {
                let _ = connection.sender.send(WsMessage::text(text));
            }
            Err(e) => warn!("failed to serialize frame for {conn_id}: {e}"),
        }
    }

    /// Rooms with at least one local member, for the reconciler.
    pub fn local_rooms(&self) -> Vec<String> {
        self.rooms.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of local members in `room`, for tests and introspection.
    pub fn local_members(&self, room: &str) -> usize {
        self.rooms
            .get(room)
            .map(|entry| entry.members.len())
            .unwrap_or(0)
    }
}
