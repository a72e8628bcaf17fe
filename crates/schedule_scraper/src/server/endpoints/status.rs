use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::types::AppState;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "started_at": s.started_at.to_rfc3339(),
        })),
    )
}

/// GET /live
/// Reports which store is serving reads
pub async fn get_live(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "live": s.switch.live_id() })))
}
