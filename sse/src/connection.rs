use crate::message::{Event, Frame};
use axum::response::sse::Event as SseEvent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::*;
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Opaque client identity token, minted upstream. One identity may hold any
/// number of simultaneous connections (tabs, devices).
pub type Identity = String;

/// Channel end the registry pushes ready-to-send SSE frames into. The
/// receiving half lives in the connection's own handler task, so the actual
/// socket write never happens under a registry lock.
pub type FrameSender = UnboundedSender<Result<SseEvent, Infallible>>;

/// Unique identifier for a connection (server-generated)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a single stream connection.
///
/// `Open --(write failure | explicit close | lifetime cap | client abort)-->
/// Closed`, with `Closing` as the in-teardown step. `Closed` is terminal:
/// a closed connection is never present in the registry and never receives
/// another send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Serialize an event stamped with a sequence number into one frame's
/// `data:` payload.
fn render_frame(event: &Event, sequence: u64) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Frame {
        event: event.clone(),
        sequence,
    })
}

/// Per-connection bookkeeping held by the registry.
pub struct ConnectionInfo {
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub state: ConnectionState,
    sender: FrameSender,
    sequence: AtomicU64,
}

impl ConnectionInfo {
    fn new(identity: Identity, sender: FrameSender) -> Self {
        let now = Utc::now();
        Self {
            identity,
            created_at: now,
            last_heartbeat_at: now,
            state: ConnectionState::Open,
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Build the next frame for this connection, stamping its sequence
    /// number (monotonic from 1, shared across event kinds). Returns `None`
    /// on a serialization error, which is logged and not treated as a
    /// transport failure.
    fn next_frame(&self, event: &Event) -> Option<SseEvent> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        match render_frame(event, sequence) {
            Ok(json) => Some(SseEvent::default().data(json)),
            Err(e) => {
                error!("Failed to serialize {} frame: {e}", event.kind());
                None
            }
        }
    }
}

/// High-performance connection registry with dual indices for O(1) lookups.
///
/// This is the single shared mutable structure on the server. Mutation is
/// sharded behind DashMap; sends are lock-free channel pushes, so a slow
/// client's socket never blocks registry operations for others. A send
/// failure is the sole, authoritative disconnect signal for a connection:
/// the failed connection is unregistered, and only that one.
pub struct ConnectionRegistry {
    /// Primary storage: lookup by connection_id for registration/cleanup - O(1)
    connections: DashMap<ConnectionId, ConnectionInfo>,

    /// Secondary index: fast lookup by identity for message routing - O(1)
    identity_index: DashMap<Identity, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            identity_index: DashMap::new(),
        }
    }

    /// Register a new connection - O(1). Duplicate identities are legal;
    /// each call creates an independent entry.
    pub fn register(&self, identity: Identity, sender: FrameSender) -> ConnectionId {
        let connection_id = ConnectionId::new();

        // Insert into primary storage
        self.connections.insert(
            connection_id.clone(),
            ConnectionInfo::new(identity.clone(), sender),
        );

        // Update secondary index
        self.identity_index
            .entry(identity)
            .or_default()
            .insert(connection_id.clone());

        connection_id
    }

    /// Unregister a connection - O(1). Idempotent: safe to call repeatedly
    /// or after the connection is already gone. Dropping the stored sender
    /// ends the handler's receive loop, which is how every teardown path
    /// (write failure, lifetime cap, client abort, shutdown) converges.
    pub fn unregister(&self, connection_id: &ConnectionId) {
        // Mark the teardown so concurrent senders stop before the removal
        // lands. Guard scope matters: `remove` touches the same shard.
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.state = ConnectionState::Closing;
        }

        if let Some((_, mut info)) = self.connections.remove(connection_id) {
            info.state = ConnectionState::Closed;
            let identity = info.identity.clone();

            // Update secondary index
            if let Some(mut entry) = self.identity_index.get_mut(&identity) {
                entry.remove(connection_id);

                // Clean up empty identity entries
                if entry.is_empty() {
                    drop(entry); // Release lock before removal
                    self.identity_index.remove(&identity);
                }
            }
        }
    }

    /// Send one event to one connection - O(1). Returns `false` when the
    /// connection is not registered (or no longer is: a failed send
    /// unregisters it before returning).
    pub fn send_to_connection(&self, connection_id: &ConnectionId, event: &Event) -> bool {
        let send_failed = {
            match self.connections.get(connection_id) {
                Some(info) if info.state == ConnectionState::Open => {
                    match info.next_frame(event) {
                        Some(frame) => info.sender.send(Ok(frame)).is_err(),
                        // Undeliverable payload, but the transport is fine.
                        None => false,
                    }
                }
                _ => return false,
            }
        };

        if send_failed {
            warn!(
                "Failed to send {} frame to connection {}: receiver closed. Unregistering.",
                event.kind(),
                connection_id.as_str()
            );
            self.unregister(connection_id);
            return false;
        }
        true
    }

    /// Send to every connection for an identity - O(1) lookup + O(k) sends
    /// where k = that identity's connections. Failures unregister only the
    /// affected connection.
    pub fn send_to_identity(&self, identity: &Identity, event: &Event) {
        // Snapshot the ids so no index lock is held while frames are pushed
        // (a failed send re-enters the registry to unregister).
        let connection_ids: Vec<ConnectionId> = match self.identity_index.get(identity) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return,
        };

        for connection_id in &connection_ids {
            self.send_to_connection(connection_id, event);
        }
    }

    /// Broadcast to all connections - O(n) (unavoidable, but explicit).
    /// Delivery is best-effort and isolated per connection: one dead
    /// receiver never stalls or fails delivery to the rest.
    pub fn broadcast(&self, event: &Event) {
        // Snapshot ids before sending: a failed send removes entries, and
        // removal during shard iteration can deadlock.
        let connection_ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        for connection_id in &connection_ids {
            self.send_to_connection(connection_id, event);
        }
    }

    /// Emit a heartbeat frame and refresh the connection's heartbeat
    /// timestamp. Returns `false` when the connection is gone, so the
    /// caller can stop its timers.
    pub fn send_heartbeat(&self, connection_id: &ConnectionId) -> bool {
        if !self.send_to_connection(connection_id, &Event::Heartbeat) {
            return false;
        }
        match self.connections.get_mut(connection_id) {
            Some(mut info) => {
                info.last_heartbeat_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn identity_count(&self) -> usize {
        self.identity_index.len()
    }

    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn last_heartbeat_at(&self, connection_id: &ConnectionId) -> Option<DateTime<Utc>> {
        self.connections
            .get(connection_id)
            .map(|info| info.last_heartbeat_at)
    }

    /// Snapshot of every live connection id, for shutdown fan-in.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
