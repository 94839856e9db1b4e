use anyhow::Result;
use chatline_server::{server, telemetry, LogFormat, ServerConfig};
use clap::Parser;
use tracing::info;

/// Chatline presence and message relay server
#[derive(Debug, Parser)]
#[command(name = "chatline-server", version, about)]
struct Cli {
    /// HTTP port (overrides CHATLINE_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Dedicated WebSocket port (overrides CHATLINE_SOCKET_PORT)
    #[arg(long)]
    socket_port: Option<u16>,

    /// Emit JSON log lines (overrides CHATLINE_LOG_FORMAT)
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(port) = cli.socket_port {
        config.socket_port = Some(port);
    }
    if cli.json_logs {
        config.log_format = LogFormat::Json;
    }

    telemetry::init(config.log_format).map_err(|e| anyhow::anyhow!(e))?;

    info!("Chatline Server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    config.log_config();

    let result = server::start(config).await;

    telemetry::shutdown();
    result
}
