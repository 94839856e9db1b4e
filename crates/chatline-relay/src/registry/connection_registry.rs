//! Connection Registry implementation.
//!
//! Tracks which connection currently serves each user.

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, instrument};

use crate::error::RelayError;
use crate::types::{ConnectionId, Session, UserId};

/// The two indexes over the session set.
///
/// Every mutation goes through `remove_user` / `remove_connection` /
/// `insert`, which touch both maps, so `by_user` and `by_connection` are
/// always exact inverses of each other.
#[derive(Debug, Default)]
struct SessionIndex {
    by_user: HashMap<UserId, ConnectionId>,
    by_connection: HashMap<ConnectionId, UserId>,
}

impl SessionIndex {
    fn remove_user(&mut self, user_id: &UserId) -> Option<ConnectionId> {
        let connection_id = self.by_user.remove(user_id)?;
        self.by_connection.remove(&connection_id);
        Some(connection_id)
    }

    fn remove_connection(&mut self, connection_id: &ConnectionId) -> Option<UserId> {
        let user_id = self.by_connection.remove(connection_id)?;
        self.by_user.remove(&user_id);
        Some(user_id)
    }

    fn insert(&mut self, user_id: UserId, connection_id: ConnectionId) {
        self.by_user.insert(user_id.clone(), connection_id.clone());
        self.by_connection.insert(connection_id, user_id);
    }
}

/// Registry of live sessions.
///
/// Thread-safe registry mapping each user to at most one connection and each
/// connection to at most one user. A single `RwLock` serializes `bind` and
/// `unbind` against each other and against concurrent lookups.
///
/// ## Usage
///
/// ```
/// use chatline_relay::{ConnectionId, ConnectionRegistry, UserId};
///
/// let registry = ConnectionRegistry::new();
///
/// // A connection announces its user:
/// registry.bind(UserId::new("u1"), ConnectionId::new("c1")).unwrap();
/// assert_eq!(registry.lookup(&UserId::new("u1")), Some(ConnectionId::new("c1")));
///
/// // The connection closes:
/// registry.unbind(&ConnectionId::new("c1"));
/// assert_eq!(registry.lookup(&UserId::new("u1")), None);
/// ```
pub struct ConnectionRegistry {
    sessions: RwLock<SessionIndex>,
}

impl ConnectionRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        info!("Creating connection registry");
        Self {
            sessions: RwLock::new(SessionIndex::default()),
        }
    }

    // Every critical section leaves the index consistent, so a panic in
    // another holder never leaves half-applied state behind.
    fn read(&self) -> RwLockReadGuard<'_, SessionIndex> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionIndex> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a user to a connection.
    ///
    /// If the user already has a session on another connection, that session
    /// is replaced and the superseded connection id is returned. The old
    /// connection is only forgotten here, never closed.
    ///
    /// If the connection was previously bound to a different user, that
    /// user's session is dropped so a connection never serves two users.
    ///
    /// Binding the same pair twice is a no-op and returns `Ok(None)`.
    #[instrument(skip_all, fields(user = %user_id, connection = %connection_id))]
    pub fn bind(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<Option<ConnectionId>, RelayError> {
        if user_id.is_blank() {
            return Err(RelayError::invalid_argument("user id must not be empty"));
        }
        if connection_id.is_blank() {
            return Err(RelayError::invalid_argument(
                "connection id must not be empty",
            ));
        }

        let mut sessions = self.write();

        if sessions.by_user.get(&user_id) == Some(&connection_id) {
            debug!("Session already bound");
            return Ok(None);
        }

        let superseded = sessions.remove_user(&user_id);
        if let Some(previous_user) = sessions.remove_connection(&connection_id) {
            debug!(previous_user = %previous_user, "Connection re-announced for another user");
        }
        sessions.insert(user_id, connection_id);
        drop(sessions);

        match &superseded {
            Some(previous) => debug!(previous_connection = %previous, "Replaced existing session"),
            None => debug!("Bound new session"),
        }

        Ok(superseded)
    }

    /// Look up the connection currently serving a user.
    pub fn lookup(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.read().by_user.get(user_id).cloned()
    }

    /// Remove the session bound to a connection.
    ///
    /// Returns the user that was unbound. Unknown connections, including ones
    /// that never announced a user, are a no-op and return `None`.
    #[instrument(skip_all, fields(connection = %connection_id))]
    pub fn unbind(&self, connection_id: &ConnectionId) -> Option<UserId> {
        let removed = self.write().remove_connection(connection_id);
        match &removed {
            Some(user_id) => debug!(user = %user_id, "Unbound session"),
            None => debug!("Connection had no session"),
        }
        removed
    }

    /// Check whether a user currently has a live session.
    pub fn is_reachable(&self, user_id: &UserId) -> bool {
        self.read().by_user.contains_key(user_id)
    }

    /// Get the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.read().by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_user.is_empty()
    }

    /// Snapshot of all live sessions, in no particular order.
    pub fn sessions(&self) -> Vec<Session> {
        self.read()
            .by_user
            .iter()
            .map(|(user_id, connection_id)| Session {
                user_id: user_id.clone(),
                connection_id: connection_id.clone(),
            })
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("session_count", &self.session_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    /// Both indexes must be exact inverses of each other.
    fn assert_consistent(registry: &ConnectionRegistry) {
        let sessions = registry.read();
        assert_eq!(sessions.by_user.len(), sessions.by_connection.len());
        for (user_id, connection_id) in &sessions.by_user {
            assert_eq!(sessions.by_connection.get(connection_id), Some(user_id));
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.session_count(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bind_and_lookup() {
        let registry = ConnectionRegistry::new();

        let superseded = registry.bind(user("u1"), conn("c1")).unwrap();

        assert!(superseded.is_none());
        assert_eq!(registry.lookup(&user("u1")), Some(conn("c1")));
        assert!(registry.is_reachable(&user("u1")));
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn test_lookup_unknown_user() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.lookup(&user("nobody")), None);
        assert!(!registry.is_reachable(&user("nobody")));
    }

    #[test]
    fn test_rebind_replaces_existing() {
        let registry = ConnectionRegistry::new();

        registry.bind(user("u1"), conn("c1")).unwrap();
        let superseded = registry.bind(user("u1"), conn("c2")).unwrap();

        assert_eq!(superseded, Some(conn("c1")));
        assert_eq!(registry.lookup(&user("u1")), Some(conn("c2")));
        assert_eq!(registry.session_count(), 1);

        // The old connection is forgotten, so closing it changes nothing
        assert_eq!(registry.unbind(&conn("c1")), None);
        assert_eq!(registry.lookup(&user("u1")), Some(conn("c2")));
        assert_consistent(&registry);
    }

    #[test]
    fn test_bind_same_pair_is_idempotent() {
        let registry = ConnectionRegistry::new();

        registry.bind(user("u1"), conn("c1")).unwrap();
        let superseded = registry.bind(user("u1"), conn("c1")).unwrap();

        assert!(superseded.is_none());
        assert_eq!(registry.lookup(&user("u1")), Some(conn("c1")));
        assert_eq!(registry.session_count(), 1);
        assert_consistent(&registry);
    }

    #[test]
    fn test_connection_reannounced_for_another_user() {
        let registry = ConnectionRegistry::new();

        registry.bind(user("u1"), conn("c1")).unwrap();
        registry.bind(user("u2"), conn("c1")).unwrap();

        assert_eq!(registry.lookup(&user("u1")), None);
        assert_eq!(registry.lookup(&user("u2")), Some(conn("c1")));
        assert_eq!(registry.session_count(), 1);
        assert_consistent(&registry);
    }

    #[test]
    fn test_bind_rejects_empty_user() {
        let registry = ConnectionRegistry::new();

        let err = registry.bind(user(""), conn("c1")).unwrap_err();

        assert!(matches!(err, RelayError::InvalidArgument(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_bind_rejects_blank_connection() {
        let registry = ConnectionRegistry::new();
        registry.bind(user("u1"), conn("c1")).unwrap();

        let err = registry.bind(user("u1"), conn("   ")).unwrap_err();

        assert!(matches!(err, RelayError::InvalidArgument(_)));
        // Existing session is untouched by a rejected bind
        assert_eq!(registry.lookup(&user("u1")), Some(conn("c1")));
    }

    #[test]
    fn test_unbind_removes_session() {
        let registry = ConnectionRegistry::new();
        registry.bind(user("u1"), conn("c1")).unwrap();

        let removed = registry.unbind(&conn("c1"));

        assert_eq!(removed, Some(user("u1")));
        assert_eq!(registry.lookup(&user("u1")), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unbind_never_bound_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.bind(user("u1"), conn("c1")).unwrap();

        assert_eq!(registry.unbind(&conn("c9")), None);
        assert_eq!(registry.unbind(&conn("c9")), None);

        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.lookup(&user("u1")), Some(conn("c1")));
    }

    #[test]
    fn test_sessions_snapshot() {
        let registry = ConnectionRegistry::new();
        registry.bind(user("u1"), conn("c1")).unwrap();
        registry.bind(user("u2"), conn("c2")).unwrap();

        let mut sessions = registry.sessions();
        sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        assert_eq!(
            sessions,
            vec![
                Session {
                    user_id: user("u1"),
                    connection_id: conn("c1"),
                },
                Session {
                    user_id: user("u2"),
                    connection_id: conn("c2"),
                },
            ]
        );
    }

    #[test]
    fn test_debug_shows_count() {
        let registry = ConnectionRegistry::new();
        registry.bind(user("u1"), conn("c1")).unwrap();
        assert_eq!(
            format!("{:?}", registry),
            "ConnectionRegistry { session_count: 1 }"
        );
    }

    #[test]
    fn test_concurrent_bind_unbind_churn() {
        const WORKERS: usize = 50;
        const PAIRS_PER_WORKER: usize = 20;

        let registry = Arc::new(ConnectionRegistry::new());
        let barrier = Arc::new(Barrier::new(WORKERS));

        let handles: Vec<_> = (0..WORKERS)
            .map(|worker| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PAIRS_PER_WORKER {
                        let user_id = UserId::new(format!("user-{worker}-{i}"));
                        let connection_id = ConnectionId::new(format!("conn-{worker}-{i}"));

                        registry.bind(user_id.clone(), connection_id.clone()).unwrap();
                        assert_eq!(registry.lookup(&user_id), Some(connection_id.clone()));
                        assert_consistent(&registry);

                        assert_eq!(registry.unbind(&connection_id), Some(user_id.clone()));
                        assert_eq!(registry.lookup(&user_id), None);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.is_empty());
        assert_consistent(&registry);
    }

    #[test]
    fn test_concurrent_rebinds_of_one_user() {
        let registry = Arc::new(ConnectionRegistry::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for round in 0..50 {
                        let connection_id = ConnectionId::new(format!("conn-{i}-{round}"));
                        registry.bind(UserId::new("shared"), connection_id).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.session_count(), 1);
        assert_consistent(&registry);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Bind(u8, u8),
        Unbind(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, 0u8..6).prop_map(|(u, c)| Op::Bind(u, c)),
            (0u8..6).prop_map(Op::Unbind),
        ]
    }

    proptest! {
        #[test]
        fn prop_sessions_stay_unique(ops in proptest::collection::vec(op_strategy(), 0..64)) {
            let registry = ConnectionRegistry::new();

            for op in ops {
                match op {
                    Op::Bind(u, c) => {
                        let user_id = UserId::new(format!("u{u}"));
                        let connection_id = ConnectionId::new(format!("c{c}"));
                        registry.bind(user_id.clone(), connection_id.clone()).unwrap();
                        prop_assert_eq!(registry.lookup(&user_id), Some(connection_id));
                    }
                    Op::Unbind(c) => {
                        let connection_id = ConnectionId::new(format!("c{c}"));
                        registry.unbind(&connection_id);
                        prop_assert!(registry
                            .sessions()
                            .iter()
                            .all(|s| s.connection_id != connection_id));
                    }
                }
                assert_consistent(&registry);
            }
        }
    }
}
