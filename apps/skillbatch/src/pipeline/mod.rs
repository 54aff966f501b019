//! Batch vacancy pipeline: resumable batch extraction, merge/reconciliation and
//! gap filling, plus the supervisor that owns the background workers.

pub mod artifacts;
pub mod checkpoint;
pub mod gap_fill;
pub mod merge;
pub mod runner;
pub mod stats;
pub mod supervisor;

use thiserror::Error;

use crate::source::table::TableError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("No batch artifacts found in {0}")]
    NoArtifacts(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// True when the error means "the thing you asked about does not exist yet".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::NoArtifacts(_) | PipelineError::NotFound(_)
        )
    }
}

/// Runs blocking file work off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
