use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::db::StoreError;
use crate::model::PrimaryKey;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// GET /tables/:table/:key
/// Returns one record from the live snapshot
pub async fn get_record(
    Path((table, key)): Path<(String, String)>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /tables/{}/{}", table, key);

    match s.switch.get(&table, &PrimaryKey::new(key)) {
        Ok(entity) => (StatusCode::OK, Json(entity)).into_response(),
        Err(e) => store_error_to_response(e),
    }
}

fn store_error_to_response(error: StoreError) -> Response {
    let (status, message) = match &error {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "Record not found"),
        StoreError::UnknownTable { .. } => (StatusCode::NOT_FOUND, "Unknown table"),
        _ => {
            error!("Failed to read from live store: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read record")
        }
    };

    ApiErrorType::from((status, message, Some(error.to_string())))
        .into_response()
}
