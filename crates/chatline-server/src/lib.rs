//! # chatline-server
//!
//! HTTP and WebSocket front end for the Chatline relay.
//!
//! The server owns the transport: it upgrades `/socket` requests, assigns
//! each socket a connection id, and feeds socket events into
//! [`chatline_relay::MessageRelay`]. It also answers health checks and the
//! presence (reachability) query used by the rest of the application.

pub mod config;
pub mod server;
pub mod shutdown;
pub mod telemetry;

pub use config::{ConfigError, Environment, LogFormat, ServerConfig};
pub use server::{create_router, create_socket_router, serve, start, AppState};
