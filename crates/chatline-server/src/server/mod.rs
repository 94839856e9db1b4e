use crate::config::ServerConfig;
use crate::shutdown::GracefulShutdown;
use anyhow::Result;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chatline_relay::{ConnectionRegistry, MessageRelay};
use serde::Serialize;
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

pub mod error;
pub mod hub;
pub mod routes;

use error::ApiError;
use hub::ConnectionHub;

/// Server application state
pub struct AppState {
    pub config: ServerConfig,
    /// Live sessions, shared with the relay
    pub registry: Arc<ConnectionRegistry>,
    /// Outbound queues of open sockets
    pub hub: Arc<ConnectionHub>,
    pub relay: MessageRelay<Arc<ConnectionHub>>,
    pub shutdown: Arc<GracefulShutdown>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = Arc::new(ConnectionHub::new(config.outbound_buffer));
        let relay = MessageRelay::new(Arc::clone(&registry), Arc::clone(&hub));
        let shutdown = Arc::new(GracefulShutdown::new(config.drain_timeout));

        Self {
            config,
            registry,
            hub,
            relay,
            shutdown,
        }
    }
}

/// Start the HTTP (and optional dedicated WebSocket) server.
///
/// Runs until Ctrl-C or SIGTERM, then drains open sockets.
pub async fn start(config: ServerConfig) -> Result<()> {
    let state = Arc::new(AppState::new(config));
    let stop = state.shutdown.stop_token();

    let http_addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let http_listener = TcpListener::bind(http_addr).await?;
    info!("Starting HTTP server on {}", http_addr);

    let socket_listener = match state.config.separate_socket_port() {
        Some(port) => {
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            let listener = TcpListener::bind(addr).await?;
            info!("Starting WebSocket server on {}", addr);
            Some(listener)
        }
        None => None,
    };

    let signals = {
        let shutdown = Arc::clone(&state.shutdown);
        tokio::spawn(async move { shutdown.watch_signals().await })
    };

    let http = serve(http_listener, create_router(Arc::clone(&state)), stop.clone());
    let socket = async {
        match socket_listener {
            Some(listener) => serve(listener, create_socket_router(Arc::clone(&state)), stop.clone()).await,
            None => Ok(()),
        }
    };

    let result = tokio::try_join!(http, socket);

    // A listener failure also has to wind the sockets down
    state.shutdown.trigger_stop();
    signals.abort();

    if !state.shutdown.drain().await {
        warn!(
            remaining_connections = state.shutdown.active_connections(),
            "Exiting with open connections"
        );
    }

    result?;
    info!("Server stopped");
    Ok(())
}

/// Serve a router on a bound listener until `stop` fires.
pub async fn serve(listener: TcpListener, app: Router, stop: CancellationToken) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await
}

/// Create the main router: health, presence and the WebSocket endpoint.
pub fn create_router(state: Arc<AppState>) -> Router {
    let presence_router = routes::presence::router(Arc::clone(&state));
    let websocket_router = routes::websocket::router(Arc::clone(&state));
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/health", get(detailed_health_handler))
        .fallback(fallback_handler)
        .with_state(state)
        .merge(presence_router)
        .merge(websocket_router)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Router for the dedicated WebSocket port.
pub fn create_socket_router(state: Arc<AppState>) -> Router {
    routes::websocket::router(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    match config.client_url.as_deref() {
        None => CorsLayer::permissive(),
        Some(origin) => match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(origin) => CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(e) => {
                warn!(origin = %origin, error = %e, "Invalid client URL, cross-origin requests disabled");
                CorsLayer::new()
            }
        },
    }
}

/// Response for detailed health check
#[derive(Debug, Serialize)]
struct DetailedHealthResponse {
    status: String,
    service: String,
    version: String,
    environment: String,
    relay: RelayHealthStatus,
}

#[derive(Debug, Serialize)]
struct RelayHealthStatus {
    /// Users with a live session
    sessions: usize,
    /// Open transport connections, identified or not
    connections: usize,
    stopping: bool,
}

/// Simple health check endpoint (for load balancers)
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.shutdown.is_stopping() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "stopping",
                "service": "chatline-server",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "chatline-server",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

/// Detailed health check endpoint (for monitoring)
async fn detailed_health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stopping = state.shutdown.is_stopping();
    let (status, status_code) = if stopping {
        ("stopping", StatusCode::SERVICE_UNAVAILABLE)
    } else {
        ("healthy", StatusCode::OK)
    };

    (
        status_code,
        Json(DetailedHealthResponse {
            status: status.to_string(),
            service: "chatline-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: state.config.environment.to_string(),
            relay: RelayHealthStatus {
                sessions: state.registry.session_count(),
                connections: state.hub.connection_count(),
                stopping,
            },
        }),
    )
}

async fn fallback_handler(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    ApiError::NotFound(format!("No route for {}", uri.path()))
        .to_response(state.config.environment)
        .into_response()
}
