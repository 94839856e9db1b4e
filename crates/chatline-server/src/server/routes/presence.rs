//! Reachability query for collaborators.
//!
//! Lets the CRUD side ask whether a user currently has a live connection,
//! for example to decide whether to show them as online.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chatline_relay::UserId;
use serde::Serialize;
use std::sync::Arc;

use crate::server::error::ApiError;
use crate::server::AppState;

/// Create the presence router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/presence/:user_id", get(presence_handler))
        .with_state(state)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub user_id: UserId,
    pub online: bool,
}

/// GET /api/v1/presence/:user_id
async fn presence_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Response {
    let user_id = UserId::new(user_id);
    if user_id.is_blank() {
        return ApiError::InvalidInput("user id must not be empty".to_string())
            .to_response(state.config.environment)
            .into_response();
    }

    let online = state.registry.is_reachable(&user_id);
    Json(PresenceResponse { user_id, online }).into_response()
}
