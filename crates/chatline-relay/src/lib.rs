//! # chatline-relay
//!
//! Presence registry and direct message relay for Chatline.
//!
//! This crate tracks which live connection serves each logged-in user and
//! relays short point-to-point text messages to that connection. It knows
//! nothing about sockets: the host server owns the transport and plugs its
//! unicast primitive in through the [`Outbound`] trait.
//!
//! ## Architecture
//!
//! - **Registry**: [`ConnectionRegistry`], a dual-indexed user/connection map
//!   behind a single lock
//! - **Relay**: [`MessageRelay`], stateless translation of transport events
//!   (connect, identify, send, disconnect) into registry operations and
//!   deliveries
//! - **Events**: JSON wire events (`add-user`, `send-message`, `get-message`)
//!
//! Delivery is best effort. A message for a user with no live session is
//! dropped without error.

pub mod events;
pub mod metrics;
pub mod registry;
pub mod relay;

mod error;
mod types;

pub use error::RelayError;
pub use events::{ClientEvent, SendMessage, ServerEvent};
pub use registry::ConnectionRegistry;
pub use relay::{MessageRelay, Outbound};
pub use types::*;
