//! Logging setup for Chatline Server.
//!
//! Console output through `tracing-subscriber`, filtered by `RUST_LOG`
//! (default: `info,chatline_server=debug,chatline_relay=debug`).

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info,chatline_server=debug,chatline_relay=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the global tracing subscriber.
///
/// `LogFormat::Json` emits one JSON object per line for log shippers;
/// `LogFormat::Pretty` is meant for local development.
///
/// Fails if a global subscriber is already installed.
pub fn init(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true);

            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty();

            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt_layer)
                .try_init()?;
        }
    }

    tracing::info!(format = ?format, "Telemetry initialized");

    Ok(())
}

/// Flush and tear down telemetry before exit.
pub fn shutdown() {
    tracing::info!("Telemetry shutdown complete");
}
