use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Reports this service's status plus the extraction service's, which is
/// `"unreachable"` when its health probe fails.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let upstream = match state.client.health().await {
        Ok(health) => serde_json::to_value(health).unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Extraction service health check failed: {e}");
            json!({ "status": "unreachable" })
        }
    };

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME"),
        "extraction_service": upstream
    }))
}
