use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Plaintext liveness check. Incidental; not part of the hub contract.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "lifeline-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
