//! Message relay between transport events and the registry.
//!
//! The relay turns connection lifecycle events into registry operations and
//! hands direct messages to the recipient's connection when one is live.
//! Messages for unreachable users are dropped: there is no queue, no retry,
//! and the sender is not told.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::error::RelayError;
use crate::events::ClientEvent;
use crate::metrics;
use crate::registry::ConnectionRegistry;
use crate::types::{ConnectionId, DirectMessage, SendOutcome, UserId};

/// The transport's unicast primitive.
///
/// Implementations enqueue onto the connection's outbound buffer and return
/// immediately; they must never block on network I/O.
pub trait Outbound: Send + Sync {
    /// Hand a message to the given connection.
    fn deliver(&self, connection_id: &ConnectionId, message: DirectMessage);
}

impl<T: Outbound + ?Sized> Outbound for Arc<T> {
    fn deliver(&self, connection_id: &ConnectionId, message: DirectMessage) {
        (**self).deliver(connection_id, message)
    }
}

/// Bridges transport events to the [`ConnectionRegistry`].
///
/// Holds no state of its own; everything lives in the shared registry.
pub struct MessageRelay<O> {
    registry: Arc<ConnectionRegistry>,
    outbound: O,
}

impl<O: Outbound> MessageRelay<O> {
    pub fn new(registry: Arc<ConnectionRegistry>, outbound: O) -> Self {
        Self { registry, outbound }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn outbound(&self) -> &O {
        &self.outbound
    }

    /// A transport connection opened. No identity is bound yet.
    #[instrument(skip_all, fields(connection = %connection_id))]
    pub fn on_connect(&self, connection_id: &ConnectionId) {
        debug!("Transport connection opened");
        metrics::record_connection_opened();
    }

    /// A connection announced the user it belongs to.
    #[instrument(skip_all, fields(user = %user_id, connection = %connection_id))]
    pub fn on_identify(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Result<(), RelayError> {
        match self.registry.bind(user_id, connection_id) {
            Ok(superseded) => {
                if let Some(previous) = superseded {
                    info!(previous_connection = %previous, "User moved to a new connection");
                }
                metrics::record_sessions_active(self.registry.session_count());
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Rejected identity announcement");
                metrics::record_identify_rejected();
                Err(e)
            }
        }
    }

    /// Relay a text to a recipient if they are reachable.
    ///
    /// Never fails: an unreachable recipient yields [`SendOutcome::Dropped`].
    #[instrument(skip_all, fields(from = %sender_user_id, to = %recipient_user_id))]
    pub fn on_send(
        &self,
        sender_user_id: UserId,
        recipient_user_id: &UserId,
        text: String,
    ) -> SendOutcome {
        let outcome = match self.registry.lookup(recipient_user_id) {
            Some(connection_id) => {
                let message = DirectMessage {
                    sender_user_id,
                    text,
                };
                self.outbound.deliver(&connection_id, message);
                debug!(connection = %connection_id, "Message handed to recipient connection");
                SendOutcome::Delivered
            }
            None => {
                debug!("Recipient not connected, dropping message");
                SendOutcome::Dropped
            }
        };
        metrics::record_message(outcome);
        outcome
    }

    /// A transport connection closed, whether or not it ever identified.
    #[instrument(skip_all, fields(connection = %connection_id))]
    pub fn on_disconnect(&self, connection_id: &ConnectionId) -> Option<UserId> {
        let unbound = self.registry.unbind(connection_id);
        debug!(user = ?unbound, "Transport connection closed");
        metrics::record_connection_closed();
        metrics::record_sessions_active(self.registry.session_count());
        unbound
    }

    /// Dispatch a decoded client event received on `connection_id`.
    ///
    /// Returns the send outcome for `send-message` events.
    pub fn handle_event(
        &self,
        connection_id: &ConnectionId,
        event: ClientEvent,
    ) -> Result<Option<SendOutcome>, RelayError> {
        match event {
            ClientEvent::AddUser(user_id) => {
                self.on_identify(user_id, connection_id.clone())?;
                Ok(None)
            }
            ClientEvent::SendMessage(send) => Ok(Some(self.on_send(
                send.sender_user_id,
                &send.recipient_user_id,
                send.text,
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SendMessage;
    use std::sync::Mutex;

    /// Outbound that records every delivery.
    #[derive(Default)]
    struct RecordingOutbound {
        deliveries: Mutex<Vec<(ConnectionId, DirectMessage)>>,
    }

    impl RecordingOutbound {
        fn deliveries(&self) -> Vec<(ConnectionId, DirectMessage)> {
            self.deliveries.lock().unwrap().clone()
        }
    }

    impl Outbound for RecordingOutbound {
        fn deliver(&self, connection_id: &ConnectionId, message: DirectMessage) {
            self.deliveries
                .lock()
                .unwrap()
                .push((connection_id.clone(), message));
        }
    }

    fn relay() -> MessageRelay<Arc<RecordingOutbound>> {
        MessageRelay::new(
            Arc::new(ConnectionRegistry::new()),
            Arc::new(RecordingOutbound::default()),
        )
    }

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    #[test]
    fn test_connect_does_not_bind() {
        let relay = relay();
        relay.on_connect(&conn("c1"));
        assert!(relay.registry().is_empty());
    }

    #[test]
    fn test_identify_binds_user() {
        let relay = relay();
        relay.on_connect(&conn("cB"));
        relay.on_identify(user("bob"), conn("cB")).unwrap();
        assert_eq!(relay.registry().lookup(&user("bob")), Some(conn("cB")));
    }

    #[test]
    fn test_identify_rejects_empty_user() {
        let relay = relay();
        let err = relay.on_identify(user(""), conn("c1")).unwrap_err();
        assert!(matches!(err, RelayError::InvalidArgument(_)));
        assert!(relay.registry().is_empty());
    }

    #[test]
    fn test_send_routes_to_recipient_connection() {
        let relay = relay();
        relay.on_identify(user("bob"), conn("cB")).unwrap();

        let outcome = relay.on_send(user("alice"), &user("bob"), "hi".to_string());

        assert_eq!(outcome, SendOutcome::Delivered);
        assert_eq!(
            relay.outbound().deliveries(),
            vec![(
                conn("cB"),
                DirectMessage {
                    sender_user_id: user("alice"),
                    text: "hi".to_string(),
                }
            )]
        );
    }

    #[test]
    fn test_send_to_unreachable_user_is_dropped() {
        let relay = relay();
        relay.on_identify(user("bob"), conn("cB")).unwrap();

        let outcome = relay.on_send(user("alice"), &user("carol"), "hi".to_string());

        assert_eq!(outcome, SendOutcome::Dropped);
        assert!(relay.outbound().deliveries().is_empty());
    }

    #[test]
    fn test_send_after_disconnect_is_dropped() {
        let relay = relay();
        relay.on_connect(&conn("cB"));
        relay.on_identify(user("bob"), conn("cB")).unwrap();

        assert_eq!(relay.on_disconnect(&conn("cB")), Some(user("bob")));
        let outcome = relay.on_send(user("alice"), &user("bob"), "hi".to_string());

        assert_eq!(outcome, SendOutcome::Dropped);
        assert!(relay.outbound().deliveries().is_empty());
    }

    #[test]
    fn test_send_follows_newest_connection() {
        let relay = relay();
        relay.on_identify(user("bob"), conn("c1")).unwrap();
        relay.on_identify(user("bob"), conn("c2")).unwrap();

        relay.on_send(user("alice"), &user("bob"), "hi".to_string());

        let deliveries = relay.outbound().deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, conn("c2"));
    }

    #[test]
    fn test_disconnect_of_stale_connection_keeps_new_session() {
        let relay = relay();
        relay.on_identify(user("bob"), conn("c1")).unwrap();
        relay.on_identify(user("bob"), conn("c2")).unwrap();

        assert_eq!(relay.on_disconnect(&conn("c1")), None);
        assert_eq!(relay.registry().lookup(&user("bob")), Some(conn("c2")));
    }

    #[test]
    fn test_disconnect_without_identify_is_noop() {
        let relay = relay();
        relay.on_connect(&conn("c1"));
        assert_eq!(relay.on_disconnect(&conn("c1")), None);
        assert!(relay.registry().is_empty());
    }

    #[test]
    fn test_handle_event_dispatch() {
        let relay = relay();

        let outcome = relay
            .handle_event(&conn("cB"), ClientEvent::AddUser(user("bob")))
            .unwrap();
        assert_eq!(outcome, None);

        let outcome = relay
            .handle_event(
                &conn("cA"),
                ClientEvent::SendMessage(SendMessage {
                    sender_user_id: user("alice"),
                    recipient_user_id: user("bob"),
                    text: "hi".to_string(),
                }),
            )
            .unwrap();
        assert_eq!(outcome, Some(SendOutcome::Delivered));
        assert_eq!(relay.outbound().deliveries().len(), 1);
    }

    #[test]
    fn test_handle_event_surfaces_invalid_identity() {
        let relay = relay();
        let result = relay.handle_event(&conn("c1"), ClientEvent::AddUser(user(" ")));
        assert!(matches!(result, Err(RelayError::InvalidArgument(_))));
    }
}
