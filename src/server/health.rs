//! Liveness endpoint.

use axum::http::StatusCode;

/// `GET /health`: 200 "OK" while the process is serving.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
