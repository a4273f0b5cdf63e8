//! Connection management module
//!
//! Manages client connections including:
//! - Connection lifecycle (creation, tracking, cleanup)
//! - Connection state machine (connected -> active -> disconnected)
//! - Spatial anchors used for visibility queries
//! - The live broadcast-group subscription table
//! - Thread-safe connection registry

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{NetworkError, RangecastError, Result};
use crate::visibility::group::{GroupId, GroupSet};

/// Unique connection identifier
pub type ConnectionId = u64;

/// Connection state in the session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Session established, not yet placed in the world
    Connected,
    /// In the world and receiving broadcasts
    Active,
    /// Connection is disconnecting
    Disconnecting,
    /// Connection has been disconnected
    Disconnected,
}

impl ConnectionState {
    /// Check if the connection is still alive (not disconnecting/disconnected)
    pub fn is_alive(&self) -> bool {
        !matches!(
            self,
            ConnectionState::Disconnecting | ConnectionState::Disconnected
        )
    }

    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "Connected",
            ConnectionState::Active => "Active",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A connected client
///
/// Owned by the session layer. The visibility core only reads the anchors
/// and mutates the subscription table and the two flags.
pub struct Connection {
    /// Unique connection identifier
    pub id: ConnectionId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Current connection state
    state: RwLock<ConnectionState>,
    /// Primary anchor: the group the connection's main entity occupies
    anchor: RwLock<GroupId>,
    /// Secondary anchor: an auxiliary entity of interest, if any
    secondary_anchor: RwLock<Option<GroupId>>,
    /// Live broadcast-group subscription table
    subscriptions: RwLock<GroupSet>,
    /// Set while a full-state snapshot is streaming to this connection
    receiving_snapshot: AtomicBool,
    /// Set while a subscription reconciliation is queued or running
    reconcile_scheduled: AtomicBool,
}

impl Connection {
    /// Create a new connection anchored at the given group
    pub fn new(id: ConnectionId, address: SocketAddr, anchor: GroupId) -> Self {
        Self {
            id,
            address,
            state: RwLock::new(ConnectionState::Connected),
            anchor: RwLock::new(anchor),
            secondary_anchor: RwLock::new(None),
            subscriptions: RwLock::new(GroupSet::with_capacity(32)),
            receiving_snapshot: AtomicBool::new(false),
            reconcile_scheduled: AtomicBool::new(false),
        }
    }

    /// Get the IP address as a string (without port)
    pub fn ip(&self) -> String {
        self.address.ip().to_string()
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Set the connection state
    pub fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };
        debug!(
            connection_id = self.id,
            old_state = %old_state,
            new_state = %new_state,
            "Connection state changed"
        );
    }

    /// Check if the connection is alive
    pub fn is_alive(&self) -> bool {
        self.state().is_alive()
    }

    /// Get the primary anchor
    pub fn anchor(&self) -> GroupId {
        *self.anchor.read()
    }

    /// Move the primary anchor to a new group
    pub fn set_anchor(&self, group: GroupId) {
        *self.anchor.write() = group;
    }

    /// Get the secondary anchor, if any
    pub fn secondary_anchor(&self) -> Option<GroupId> {
        *self.secondary_anchor.read()
    }

    /// Set or clear the secondary anchor
    pub fn set_secondary_anchor(&self, group: Option<GroupId>) {
        *self.secondary_anchor.write() = group;
    }

    /// Snapshot of the current subscription table
    pub fn subscriptions(&self) -> GroupSet {
        self.subscriptions.read().clone()
    }

    /// Check whether the connection is subscribed to a group
    pub fn is_subscribed(&self, group: GroupId) -> bool {
        self.subscriptions.read().contains(group)
    }

    /// Add a group to the subscription table
    pub fn subscribe(&self, group: GroupId) -> bool {
        self.subscriptions.write().insert(group)
    }

    /// Remove a group from the subscription table
    pub fn unsubscribe(&self, group: GroupId) -> bool {
        self.subscriptions.write().remove(group)
    }

    /// Drop every subscription (teardown path)
    pub fn clear_subscriptions(&self) {
        self.subscriptions.write().clear();
    }

    /// Check whether a full-state snapshot is streaming to this connection
    pub fn is_receiving_snapshot(&self) -> bool {
        self.receiving_snapshot.load(Ordering::SeqCst)
    }

    /// Mark the start of a full-state snapshot transfer
    pub fn begin_snapshot(&self) {
        self.receiving_snapshot.store(true, Ordering::SeqCst);
    }

    /// Mark the end of a full-state snapshot transfer
    pub fn end_snapshot(&self) {
        self.receiving_snapshot.store(false, Ordering::SeqCst);
    }

    /// Check whether a reconciliation is queued or running
    pub fn is_reconcile_scheduled(&self) -> bool {
        self.reconcile_scheduled.load(Ordering::SeqCst)
    }

    /// Claim the reconciliation slot
    ///
    /// Returns false when a reconciliation is already queued or running;
    /// the winner must clear the flag when its unit completes or aborts.
    pub fn mark_reconcile_scheduled(&self) -> bool {
        self.reconcile_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the reconciliation slot
    pub fn clear_reconcile_scheduled(&self) {
        self.reconcile_scheduled.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("anchor", &self.anchor())
            .field("secondary_anchor", &self.secondary_anchor())
            .field("subscriptions", &self.subscriptions.read().len())
            .finish()
    }
}

/// Thread-safe connection registry
pub struct ConnectionManager {
    /// Map of connection ID to connection
    connections: DashMap<ConnectionId, Arc<Connection>>,
    /// Map of IP address to list of connection IDs (for connection limiting)
    ip_to_connections: DashMap<String, Vec<ConnectionId>>,
    /// Next connection ID to assign
    next_id: AtomicU64,
    /// Maximum connections per IP
    max_per_ip: usize,
}

impl ConnectionManager {
    /// Create a new connection manager
    pub fn new() -> Self {
        Self::with_limits(10)
    }

    /// Create a connection manager with a custom per-IP limit
    pub fn with_limits(max_per_ip: usize) -> Self {
        Self {
            connections: DashMap::new(),
            ip_to_connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_per_ip,
        }
    }

    /// Create a new connection and register it
    pub fn create(&self, address: SocketAddr, anchor: GroupId) -> Result<Arc<Connection>> {
        let ip = address.ip().to_string();

        // Check connection limit per IP
        let current_count = self
            .ip_to_connections
            .get(&ip)
            .map(|v| v.len())
            .unwrap_or(0);

        if current_count >= self.max_per_ip {
            warn!(
                ip = %ip,
                count = current_count,
                max = self.max_per_ip,
                "Connection limit exceeded for IP"
            );
            return Err(RangecastError::Network(NetworkError::TooManyConnections(
                ip,
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(Connection::new(id, address, anchor));

        self.connections.insert(id, connection.clone());
        self.ip_to_connections.entry(ip).or_default().push(id);

        info!(
            connection_id = id,
            address = %address,
            anchor = %anchor,
            "Connection created"
        );

        Ok(connection)
    }

    /// Get a connection by ID
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|r| r.clone())
    }

    /// Remove a connection from the registry
    pub fn remove(&self, id: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&id) {
            let ip = connection.ip();
            if let Some(mut ids) = self.ip_to_connections.get_mut(&ip) {
                ids.retain(|&cid| cid != id);
            }
            self.ip_to_connections.retain(|_, v| !v.is_empty());

            info!(connection_id = id, "Connection removed");
        }
    }

    /// Disconnect a connection: tear down its subscriptions and unregister it
    pub fn disconnect(&self, id: ConnectionId) {
        if let Some(connection) = self.get(id) {
            connection.set_state(ConnectionState::Disconnecting);
            connection.clear_subscriptions();
            connection.set_state(ConnectionState::Disconnected);
        }
        self.remove(id);
    }

    /// Disconnect all connections
    pub fn disconnect_all(&self) {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|r| *r.key()).collect();
        for id in ids {
            self.disconnect(id);
        }
    }

    /// Get the count of registered connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Get list of all connection IDs
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|r| *r.key()).collect()
    }

    /// Snapshot of every connection currently active in the world
    pub fn active_connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|r| r.state() == ConnectionState::Active)
            .map(|r| r.clone())
            .collect()
    }

    /// Iterate over all connections
    pub fn for_each<F>(&self, f: F)
    where
        F: Fn(&Connection),
    {
        for connection in self.connections.iter() {
            f(&connection);
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
