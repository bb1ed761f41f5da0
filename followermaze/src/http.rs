//! Monitoring endpoints

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tracing::error;

use followermaze_core::metrics::gather_metrics;

pub fn create_router() -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health_check))
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to gather metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn health_check() -> impl IntoResponse {
    "OK"
}
