use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::entities::DEFAULT_EXPERIMENT_ID;
use crate::handlers::AppState;

/// Health check endpoint
/// Returns 200 OK if the service is running
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "service": "tracking-server",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Readiness check endpoint
/// Returns 200 OK once the store answers queries
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get_experiment(DEFAULT_EXPERIMENT_ID).await {
        Ok(_) => (StatusCode::OK, Json(json!({
            "status": "ready",
            "service": "tracking-server",
        }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
                "status": "unavailable",
                "service": "tracking-server",
                "error": e.message(),
            })))
        }
    }
}
