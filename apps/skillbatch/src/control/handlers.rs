use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::control::{commands, CommandReply};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct GapFillRequest {
    pub limit: Option<usize>,
    #[serde(default)]
    pub retry_unresolved: bool,
}

impl GapFillRequest {
    /// An empty body means defaults; anything else must be a valid request.
    pub fn from_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid gap-fill request: {e}")))
    }
}

/// GET /api/v1/help
pub async fn handle_help() -> Json<CommandReply> {
    Json(commands::help())
}

/// GET /api/v1/progress
pub async fn handle_progress(
    State(state): State<AppState>,
) -> Result<Json<CommandReply>, AppError> {
    Ok(Json(commands::progress(&state).await?))
}

/// POST /api/v1/processing/start
pub async fn handle_start_processing(
    State(state): State<AppState>,
) -> Result<Json<CommandReply>, AppError> {
    Ok(Json(commands::start_processing(&state)?))
}

/// POST /api/v1/processing/stop
pub async fn handle_stop_processing(State(state): State<AppState>) -> Json<CommandReply> {
    Json(commands::stop_processing(&state))
}

/// POST /api/v1/merge
pub async fn handle_merge(State(state): State<AppState>) -> Result<Json<CommandReply>, AppError> {
    Ok(Json(commands::merge_batches(&state).await?))
}

/// POST /api/v1/merge/source
pub async fn handle_merge_with_source(
    State(state): State<AppState>,
) -> Result<Json<CommandReply>, AppError> {
    Ok(Json(commands::merge_with_source(&state).await?))
}

/// POST /api/v1/gap-fill/start
/// The body is optional; without one every gap row is processed.
pub async fn handle_start_gap_fill(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CommandReply>, AppError> {
    let req = GapFillRequest::from_body(&body)?;
    Ok(Json(commands::start_gap_fill(
        &state,
        req.limit,
        req.retry_unresolved,
    )?))
}

/// POST /api/v1/gap-fill/stop
pub async fn handle_stop_gap_fill(State(state): State<AppState>) -> Json<CommandReply> {
    Json(commands::stop_gap_fill(&state))
}

/// GET /api/v1/statistics
pub async fn handle_statistics(
    State(state): State<AppState>,
) -> Result<Json<CommandReply>, AppError> {
    Ok(Json(commands::statistics(&state).await?))
}

/// GET /api/v1/artifacts/:offset
pub async fn handle_get_artifact(
    State(state): State<AppState>,
    Path(offset): Path<usize>,
) -> Result<impl IntoResponse, AppError> {
    let (name, bytes) = commands::fetch_artifact(&state, offset).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv".to_string())],
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{name}\""),
        )],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_fill_request_from_body() {
        let req = GapFillRequest::from_body(b"").unwrap();
        assert_eq!((req.limit, req.retry_unresolved), (None, false));
        assert!(GapFillRequest::from_body(b" \n").unwrap().limit.is_none());

        let req = GapFillRequest::from_body(br#"{"limit": 3, "retry_unresolved": true}"#).unwrap();
        assert_eq!((req.limit, req.retry_unresolved), (Some(3), true));

        assert!(matches!(
            GapFillRequest::from_body(br#"{"limit": -5}"#),
            Err(AppError::Validation(_))
        ));
        assert!(GapFillRequest::from_body(b"null").is_err());
    }
}
