//! Router configuration for the web server.

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::middleware::{enforce_admission, require_basic_auth};
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Admission runs first, then credentials, then the body is read
    let uploads = Router::new()
        .route("/upload", post(handlers::upload_file))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .route_layer(from_fn_with_state(state.clone(), require_basic_auth))
        .route_layer(from_fn_with_state(state.clone(), enforce_admission));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/health-check", get(handlers::health_check))
        .merge(uploads)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
