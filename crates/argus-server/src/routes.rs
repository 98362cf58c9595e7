use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::ServerError;
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/remediate", post(remediate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ServerError> {
    if let argus_runtime::PolicyState::Unavailable { reason } = state.remediation.policy() {
        return Err(ServerError::Unavailable(reason.clone()));
    }
    Ok(Json(json!({ "ok": true, "service": "argus-server" })))
}

async fn remediate(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let response = state.remediation.handle(&body).await;
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}
