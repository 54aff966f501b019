pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::control::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/help", get(handlers::handle_help))
        .route("/api/v1/progress", get(handlers::handle_progress))
        // Batch processing
        .route(
            "/api/v1/processing/start",
            post(handlers::handle_start_processing),
        )
        .route(
            "/api/v1/processing/stop",
            post(handlers::handle_stop_processing),
        )
        // Merge & reconciliation
        .route("/api/v1/merge", post(handlers::handle_merge))
        .route(
            "/api/v1/merge/source",
            post(handlers::handle_merge_with_source),
        )
        // Gap filling
        .route(
            "/api/v1/gap-fill/start",
            post(handlers::handle_start_gap_fill),
        )
        .route("/api/v1/gap-fill/stop", post(handlers::handle_stop_gap_fill))
        .route("/api/v1/statistics", get(handlers::handle_statistics))
        .route(
            "/api/v1/artifacts/:offset",
            get(handlers::handle_get_artifact),
        )
        .with_state(state)
}
