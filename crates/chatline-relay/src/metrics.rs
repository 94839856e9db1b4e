//! Relay metrics for observability.
//!
//! Uses the global OpenTelemetry meter provider. When the host application
//! installs no provider these instruments are no-ops.

use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

use crate::types::SendOutcome;

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("chatline-relay"))
}

// ============================================================================
// Counters (Cumulative)
// ============================================================================

/// Counter for relayed messages, labelled by outcome.
pub fn messages_relayed() -> Counter<u64> {
    meter()
        .u64_counter("relay.messages")
        .with_description("Total direct messages relayed, by outcome")
        .with_unit("message")
        .build()
}

/// Counter for transport connection lifecycle events.
pub fn connection_events() -> Counter<u64> {
    meter()
        .u64_counter("relay.connections.events")
        .with_description("Total transport connections opened and closed")
        .with_unit("event")
        .build()
}

/// Counter for rejected identity announcements.
pub fn identify_rejections() -> Counter<u64> {
    meter()
        .u64_counter("relay.identify.rejected")
        .with_description("Total identity announcements rejected as malformed")
        .with_unit("event")
        .build()
}

// ============================================================================
// Gauges (Current State)
// ============================================================================

/// Gauge for live sessions in the registry.
pub fn sessions_active() -> Gauge<i64> {
    meter()
        .i64_gauge("relay.sessions.active")
        .with_description("Current number of users with a live session")
        .with_unit("session")
        .build()
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record the outcome of one relayed message.
pub fn record_message(outcome: SendOutcome) {
    messages_relayed().add(1, &[KeyValue::new("outcome", outcome.to_string())]);
}

/// Record a connection opening.
pub fn record_connection_opened() {
    connection_events().add(1, &[KeyValue::new("event", "opened")]);
}

/// Record a connection closing.
pub fn record_connection_closed() {
    connection_events().add(1, &[KeyValue::new("event", "closed")]);
}

/// Record a rejected identity announcement.
pub fn record_identify_rejected() {
    identify_rejections().add(1, &[]);
}

/// Record the current number of live sessions.
pub fn record_sessions_active(count: usize) {
    sessions_active().record(count as i64, &[]);
}
