//! Connection registry implementation
//!
//! The central in-memory registry of live connections for one namespace:
//! which connections exist, which device identity each carries, and which
//! rooms each belongs to. Supports targeted send, room broadcast, and
//! membership enumeration.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tokio::sync::RwLock;

use crate::session::Epoch;
use crate::store::{Device, DeviceId};

use super::event::Event;
use super::room::RoomId;

/// Transport-assigned identifier of one live connection
pub type ConnectionId = u64;

/// Sending half of a connection's event channel
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiving half, owned by the transport layer writing to the peer
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Registry-owned state of one live connection
#[derive(Debug)]
pub struct ConnectionEntry {
    /// Device identity, present on terminal connections only
    pub device_id: Option<DeviceId>,

    /// Session token the device presented or was issued
    pub session_token: Option<String>,

    /// The device's screen code
    pub code: Option<String>,

    /// Epoch stamped when this connection reconciled
    pub epoch: Option<Epoch>,

    /// Rooms this connection has joined
    pub rooms: HashSet<RoomId>,

    tx: EventSender,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    by_token: HashMap<String, ConnectionId>,
}

/// Live-connection registry for one namespace
///
/// Process-local state with lifetime = process lifetime; nothing here is
/// persisted. All mutations go through one `RwLock`, which is the single
/// mutation owner the read-decide-write sections rely on. Sends are
/// best-effort over each connection's unbounded channel, so a slow or dead
/// peer never stalls a broadcast.
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a terminal connection carrying a device identity
    ///
    /// The token index is last-write-wins: when a terminal reconnects
    /// before its previous connection is unregistered, lookups must
    /// resolve to the fresh connection.
    pub async fn register_device(
        &self,
        connection_id: ConnectionId,
        device: &Device,
        epoch: Epoch,
        tx: EventSender,
    ) {
        let mut inner = self.inner.write().await;

        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                device_id: Some(device.id),
                session_token: Some(device.session_token.clone()),
                code: device.code.clone(),
                epoch: Some(epoch),
                rooms: HashSet::new(),
                tx,
            },
        );
        inner
            .by_token
            .insert(device.session_token.clone(), connection_id);

        tracing::debug!(
            connection_id = connection_id,
            device_id = device.id,
            "terminal connection registered"
        );
    }

    /// Register a viewer connection with no device identity
    pub async fn register_viewer(&self, connection_id: ConnectionId, tx: EventSender) {
        let mut inner = self.inner.write().await;

        inner.connections.insert(
            connection_id,
            ConnectionEntry {
                device_id: None,
                session_token: None,
                code: None,
                epoch: None,
                rooms: HashSet::new(),
                tx,
            },
        );

        tracing::debug!(connection_id = connection_id, "viewer connection registered");
    }

    /// Remove a connection, leaving all of its rooms
    ///
    /// Returns the removed entry so the caller can finish the disconnect
    /// protocol (epoch-guarded flag write, room re-broadcast).
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<ConnectionEntry> {
        let mut inner = self.inner.write().await;

        let entry = inner.connections.remove(&connection_id)?;

        for room in &entry.rooms {
            let emptied = inner.rooms.get_mut(room).is_some_and(|members| {
                members.remove(&connection_id);
                members.is_empty()
            });
            if emptied {
                inner.rooms.remove(room);
            }
        }

        // Only drop the token mapping if it still points at this
        // connection; a reconnect may have taken it over already.
        if let Some(ref token) = entry.session_token {
            if inner.by_token.get(token) == Some(&connection_id) {
                inner.by_token.remove(token);
            }
        }

        tracing::debug!(connection_id = connection_id, "connection unregistered");
        Some(entry)
    }

    /// Send an event to one connection
    ///
    /// Returns false if the connection is gone or its channel is closed.
    pub async fn send(&self, connection_id: ConnectionId, event: Event) -> bool {
        let inner = self.inner.read().await;

        match inner.connections.get(&connection_id) {
            Some(entry) => {
                let name = event.name();
                let delivered = entry.tx.send(event).is_ok();
                if !delivered {
                    tracing::debug!(
                        connection_id = connection_id,
                        event = name,
                        "send to closed connection dropped"
                    );
                }
                delivered
            }
            None => false,
        }
    }

    /// Broadcast an event to every member of a room
    ///
    /// Best-effort per member; returns the number of deliveries.
    pub async fn broadcast(&self, room: &RoomId, event: Event) -> usize {
        let inner = self.inner.read().await;

        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };

        let mut delivered = 0;
        for connection_id in members {
            if let Some(entry) = inner.connections.get(connection_id) {
                if entry.tx.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        tracing::trace!(
            room = %room,
            event = event.name(),
            delivered = delivered,
            "room broadcast"
        );
        delivered
    }

    /// Join a connection to a room
    pub async fn join(&self, connection_id: ConnectionId, room: RoomId) -> bool {
        let mut inner = self.inner.write().await;

        let Some(entry) = inner.connections.get_mut(&connection_id) else {
            return false;
        };
        entry.rooms.insert(room.clone());
        inner.rooms.entry(room).or_default().insert(connection_id);
        true
    }

    /// Leave a room
    pub async fn leave(&self, connection_id: ConnectionId, room: &RoomId) -> bool {
        let mut inner = self.inner.write().await;

        if let Some(entry) = inner.connections.get_mut(&connection_id) {
            entry.rooms.remove(room);
        }
        let Some(members) = inner.rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&connection_id);
        let emptied = members.is_empty();
        if emptied {
            inner.rooms.remove(room);
        }
        removed
    }

    /// Connections currently in a room
    pub async fn members_of(&self, room: &RoomId) -> Vec<ConnectionId> {
        let inner = self.inner.read().await;
        inner
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Device identities currently present in a room
    ///
    /// This is the live side of the merged screen list: a persisted row
    /// whose device is absent here is rendered disconnected.
    pub async fn devices_in(&self, room: &RoomId) -> HashSet<DeviceId> {
        let inner = self.inner.read().await;

        let Some(members) = inner.rooms.get(room) else {
            return HashSet::new();
        };
        members
            .iter()
            .filter_map(|id| inner.connections.get(id))
            .filter_map(|entry| entry.device_id)
            .collect()
    }

    /// Resolve the live connection holding a session token
    pub async fn find_by_token(&self, token: &str) -> Option<ConnectionId> {
        let inner = self.inner.read().await;
        inner.by_token.get(token).copied()
    }

    /// Whether a connection is currently registered
    pub async fn is_live(&self, connection_id: ConnectionId) -> bool {
        self.inner.read().await.connections.contains_key(&connection_id)
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// Drop all connection and room state; explicit teardown on shutdown
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.connections.clear();
        inner.rooms.clear();
        inner.by_token.clear();
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: DeviceId, token: &str) -> Device {
        Device {
            id,
            session_token: token.to_owned(),
            code: Some("AB12C".to_owned()),
            name: None,
            connected: true,
            location_id: None,
            voter_id: None,
        }
    }

    #[tokio::test]
    async fn test_send_reaches_registered_connection() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        registry.register_device(1, &device(10, "tok"), 1, tx).await;

        assert!(registry.send(1, Event::SubmitVote).await);
        assert_eq!(rx.recv().await.unwrap(), Event::SubmitVote);

        assert!(!registry.send(2, Event::SubmitVote).await);
    }

    #[tokio::test]
    async fn test_broadcast_hits_room_members_only() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        registry.register_viewer(1, tx_a).await;
        registry.register_viewer(2, tx_b).await;
        registry.join(1, RoomId::location(5)).await;

        let delivered = registry
            .broadcast(&RoomId::location(5), Event::CancelVote)
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(rx_a.recv().await.unwrap(), Event::CancelVote);
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_dead_member() {
        let registry = ConnectionRegistry::new();
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        registry.register_viewer(1, tx_a).await;
        registry.register_viewer(2, tx_b).await;
        registry.join(1, RoomId::location(5)).await;
        registry.join(2, RoomId::location(5)).await;

        drop(rx_a);
        let delivered = registry
            .broadcast(&RoomId::location(5), Event::CancelVote)
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(rx_b.recv().await.unwrap(), Event::CancelVote);
    }

    #[tokio::test]
    async fn test_unregister_leaves_rooms() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.register_device(1, &device(10, "tok"), 1, tx).await;
        registry.join(1, RoomId::location(5)).await;

        let entry = registry.unregister(1).await.unwrap();
        assert_eq!(entry.device_id, Some(10));
        assert_eq!(entry.epoch, Some(1));
        assert!(entry.rooms.contains(&RoomId::location(5)));

        assert!(registry.members_of(&RoomId::location(5)).await.is_empty());
        assert_eq!(registry.find_by_token("tok").await, None);
    }

    #[tokio::test]
    async fn test_token_index_survives_stale_unregister() {
        let registry = ConnectionRegistry::new();
        let (tx_old, _rx_old) = mpsc::unbounded_channel();
        let (tx_new, _rx_new) = mpsc::unbounded_channel();

        let d = device(10, "tok");
        registry.register_device(1, &d, 1, tx_old).await;
        // Reconnect takes over the token before the old connection closes.
        registry.register_device(2, &d, 2, tx_new).await;
        assert_eq!(registry.find_by_token("tok").await, Some(2));

        registry.unregister(1).await.unwrap();
        assert_eq!(registry.find_by_token("tok").await, Some(2));
    }

    #[tokio::test]
    async fn test_devices_in_room() {
        let registry = ConnectionRegistry::new();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();

        registry.register_device(1, &device(10, "tok-a"), 1, tx_a).await;
        registry.register_device(2, &device(11, "tok-b"), 2, tx_b).await;
        registry.join(1, RoomId::location(5)).await;

        let present = registry.devices_in(&RoomId::location(5)).await;
        assert!(present.contains(&10));
        assert!(!present.contains(&11));
    }

    #[tokio::test]
    async fn test_clear_drops_everything() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.register_device(1, &device(10, "tok"), 1, tx).await;
        registry.join(1, RoomId::location(5)).await;
        registry.clear().await;

        assert_eq!(registry.connection_count().await, 0);
        assert_eq!(registry.find_by_token("tok").await, None);
        assert!(registry.members_of(&RoomId::location(5)).await.is_empty());
    }
}
