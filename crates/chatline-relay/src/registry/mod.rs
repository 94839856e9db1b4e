//! Connection Registry for presence tracking.
//!
//! This module provides a thread-safe registry that tracks, for each user,
//! the one transport connection currently serving them.
//!
//! ## Architecture
//!
//! Two indexes are kept in lockstep under a single lock so that lookups by
//! user and removals by connection are both O(1):
//!
//! ```text
//!   lookup(user) ──► by_user: HashMap<UserId, ConnectionId>
//!                         ▲               │
//!                         │   kept in     │
//!                         │   sync        ▼
//!   unbind(conn) ──► by_connection: HashMap<ConnectionId, UserId>
//! ```

mod connection_registry;

pub use connection_registry::ConnectionRegistry;
