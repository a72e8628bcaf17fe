use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::server::endpoints::{catalog, status};
use crate::types::AppState;

mod endpoints;
mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(status::get_health))
        .route("/live", get(status::get_live))
        .route("/tables/:table/:key", get(catalog::get_record))
        .with_state(app_state)
}
