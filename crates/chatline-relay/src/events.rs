//! Wire events exchanged with clients.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//!
//! Client to server:
//! - `add-user`: `data` is the announcing user's id
//! - `send-message`: `data` is `{"senderUid", "receiverUid", "text"}`
//!
//! Server to client:
//! - `get-message`: `data` is `{"senderUid", "text"}`
//! - `error`: `data` is `{"message"}`

use serde::{Deserialize, Serialize};

use crate::types::{DirectMessage, UserId};

/// Event received from a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// The connection announces which user it belongs to
    AddUser(UserId),
    /// Relay a text to another user
    SendMessage(SendMessage),
}

impl ClientEvent {
    /// Decode a text frame.
    pub fn from_json(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Payload of a `send-message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    #[serde(rename = "senderUid")]
    pub sender_user_id: UserId,
    #[serde(rename = "receiverUid")]
    pub recipient_user_id: UserId,
    pub text: String,
}

/// Event pushed to a client connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// A message relayed from another user
    GetMessage(DirectMessage),
    /// A request from this connection was rejected
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Encode as a text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<DirectMessage> for ServerEvent {
    fn from(message: DirectMessage) -> Self {
        Self::GetMessage(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}
