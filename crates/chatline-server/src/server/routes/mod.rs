//! HTTP route modules

pub mod presence;
pub mod websocket;
