//! WebSocket transport for the relay.
//!
//! Each socket is one transport connection. Text frames carry JSON events
//! (see `chatline_relay::events`); the socket task feeds them to the relay
//! and writes whatever the hub queues for this connection back out.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use chatline_relay::{ClientEvent, ConnectionId, ServerEvent};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::server::AppState;

/// Path of the WebSocket endpoint.
pub const SOCKET_PATH: &str = "/socket";

/// Create the WebSocket router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(SOCKET_PATH, get(socket_handler))
        .with_state(state)
}

/// GET /socket
///
/// Upgrades the HTTP connection and hands the socket to the relay.
async fn socket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    debug!("WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one socket from upgrade to close.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let _guard = state.shutdown.connection_guard();
    let connection_id = ConnectionId::new(Uuid::new_v4().to_string());
    let stop = state.shutdown.stop_token();

    let (mut sender, mut receiver) = socket.split();
    let mut outbound = state.hub.register(connection_id.clone());
    state.relay.on_connect(&connection_id);
    info!(connection = %connection_id, "WebSocket connection established");

    loop {
        tokio::select! {
            _ = stop.cancelled() => {
                debug!(connection = %connection_id, "Server stopping, closing socket");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            event = outbound.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = send_event(&mut sender, &event).await {
                    error!(connection = %connection_id, error = %e, "Failed to send WebSocket message");
                    break;
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &connection_id, &text);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!(connection = %connection_id, "Received binary WebSocket message (not supported)");
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            error!(connection = %connection_id, error = %e, "Failed to send pong");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(connection = %connection_id, "WebSocket closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(connection = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }
        }
    }

    state.relay.on_disconnect(&connection_id);
    state.hub.unregister(&connection_id);
    info!(connection = %connection_id, "WebSocket connection closed");
}

/// Decode one text frame and dispatch it to the relay.
///
/// Malformed frames are logged and skipped. A rejected `add-user` is
/// reported back to the client as an `error` event.
fn handle_frame(state: &AppState, connection_id: &ConnectionId, frame: &str) {
    let event = match ClientEvent::from_json(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Ignoring malformed frame");
            return;
        }
    };

    if let Err(e) = state.relay.handle_event(connection_id, event) {
        state.hub.push(connection_id, ServerEvent::error(e.to_string()));
    }
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let frame = match event.to_json() {
        Ok(frame) => frame,
        Err(e) => {
            error!(error = %e, "Failed to encode outbound event");
            return Ok(());
        }
    };
    sender.send(Message::Text(frame)).await
}
