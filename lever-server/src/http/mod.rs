//! HTTP server module

mod api;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use api::{HealthResponse, SelectArmResponse, UpdateArmRequest, UpdateArmResponse};

/// Create the HTTP router with all routes configured.
///
/// Every request is traced and bounded by `request_timeout`.
pub fn create_router(state: Arc<AppState>, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/health", get(api::health))
        .route(
            "/select-arm",
            get(api::select_arm).fallback(api::not_implemented),
        )
        .route(
            "/update-arm",
            post(api::update_arm).fallback(api::not_implemented),
        )
        .route("/stats", get(api::stats))
        .route("/logs", get(api::logs))
        .route("/sweep", post(api::sweep))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}
