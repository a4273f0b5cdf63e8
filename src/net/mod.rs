//! Networking module
//!
//! This module handles connection bookkeeping for the server:
//! - Connection lifecycle and state machine
//! - Spatial anchors and the subscription table
//! - Thread-safe connection registry

pub mod connection;

pub use connection::{Connection, ConnectionId, ConnectionManager, ConnectionState};
