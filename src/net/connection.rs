//! Connection registry
//!
//! Maps live connections to the player they act for. The registry never
//! creates or destroys players; it only holds their ids.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::state::PlayerId;

/// Connection identifier
pub type ConnectionId = u64;

/// Serialized message shared between all recipients of a broadcast
pub type Payload = Arc<str>;

/// Sending side of one connection's outbound queue.
///
/// A writer task owns the receiving side and forwards payloads to the socket.
/// Once that task ends (socket closed or write failed) the queue reports
/// closed and every later send fails.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Payload>,
}

impl ConnectionHandle {
    /// Create a handle with a random id and a queue of `capacity` payloads
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Payload>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: rand::random::<u64>(),
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn outbound(&self) -> &mpsc::Sender<Payload> {
        &self.outbound
    }
}

#[derive(Debug)]
struct ConnectionEntry {
    handle: ConnectionHandle,
    player_id: PlayerId,
    connected_at: Instant,
}

/// Registry of live connections, guarded by its own lock
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a player. Returns false if already registered.
    pub fn register(&self, handle: &ConnectionHandle, player_id: PlayerId) -> bool {
        let mut connections = self.connections.write();
        if connections.contains_key(&handle.id) {
            return false;
        }
        connections.insert(
            handle.id,
            ConnectionEntry {
                handle: handle.clone(),
                player_id,
                connected_at: Instant::now(),
            },
        );
        true
    }

    /// Remove a connection, returning the player it was bound to.
    /// Removing an unknown connection is a no-op.
    pub fn unregister(&self, id: ConnectionId) -> Option<PlayerId> {
        self.connections.write().remove(&id).map(|entry| entry.player_id)
    }

    /// Player bound to a connection
    pub fn lookup_player(&self, id: ConnectionId) -> Option<PlayerId> {
        self.connections.read().get(&id).map(|entry| entry.player_id.clone())
    }

    /// How long a connection has been registered
    pub fn connected_for(&self, id: ConnectionId) -> Option<Duration> {
        self.connections
            .read()
            .get(&id)
            .map(|entry| entry.connected_at.elapsed())
    }

    /// Handles of every registered connection at this instant
    pub fn handles(&self) -> Vec<ConnectionHandle> {
        self.connections
            .read()
            .values()
            .map(|entry| entry.handle.clone())
            .collect()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}

/// Scoped registration: the connection is unregistered when the guard drops,
/// on every exit path of the task that owns it.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Register `handle` and return the guard, or None if it was already registered
    pub fn register(
        registry: Arc<ConnectionRegistry>,
        handle: &ConnectionHandle,
        player_id: PlayerId,
    ) -> Option<Self> {
        if !registry.register(handle, player_id) {
            return None;
        }
        Some(Self {
            registry,
            id: handle.id(),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(player_id) = self.registry.unregister(self.id) {
            debug!("Unregistered connection {} (player {})", self.id, player_id);
        }
    }
}
