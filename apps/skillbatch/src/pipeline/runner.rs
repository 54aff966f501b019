//! Batch Runner: walks the source in fixed-size windows from the resume offset,
//! extracts skills record by record, and persists one artifact per window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::extraction::SkillExtractor;
use crate::pipeline::artifacts::{ArtifactRow, ArtifactStore};
use crate::pipeline::{blocking, PipelineError};
use crate::source::SourceReader;

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub batch_size: usize,
    /// Pause between two consecutive extraction calls.
    pub request_delay: Duration,
    /// Explicit start row; `None` resumes from the artifacts on disk.
    pub start_offset: Option<usize>,
    pub max_batches: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every source row is covered by an artifact.
    Exhausted,
    Cancelled,
    BatchLimit,
    /// The source reported zero rows.
    EmptySource,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub start_offset: usize,
    pub end_offset: usize,
    pub total_rows: usize,
    pub batches_written: usize,
    pub records_processed: usize,
    pub stop_reason: StopReason,
}

pub struct BatchRunner {
    reader: SourceReader,
    store: ArtifactStore,
    extractor: Arc<dyn SkillExtractor>,
    settings: RunnerSettings,
}

impl BatchRunner {
    pub fn new(
        reader: SourceReader,
        store: ArtifactStore,
        extractor: Arc<dyn SkillExtractor>,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            reader,
            store,
            extractor,
            settings,
        }
    }

    /// Runs until the source is exhausted, the batch limit is hit, or `cancel`
    /// fires. Cancellation is observed between batches only; a batch that has
    /// started is always finished and persisted. A failed artifact write ends
    /// the run with an error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let batch_size = self.settings.batch_size.max(1);

        let store = self.store.clone();
        store.ensure_dir()?;

        let reader = self.reader.clone();
        let total_rows = blocking(move || Ok(reader.total_rows())).await?;

        let start_offset = match self.settings.start_offset {
            Some(offset) => offset,
            None => {
                let store = store.clone();
                blocking(move || store.resume_offset()).await?
            }
        };

        info!(
            %run_id,
            total_rows,
            start_offset,
            batch_size,
            "Batch run starting"
        );

        let mut summary = RunSummary {
            run_id,
            started_at,
            finished_at: started_at,
            start_offset,
            end_offset: start_offset,
            total_rows,
            batches_written: 0,
            records_processed: 0,
            stop_reason: StopReason::Exhausted,
        };

        if total_rows == 0 {
            error!(%run_id, path = %self.reader.path().display(), "Source has no rows to process");
            summary.stop_reason = StopReason::EmptySource;
            summary.finished_at = Utc::now();
            return Ok(summary);
        }

        let mut offset = start_offset;
        let mut first_call = true;

        while offset < total_rows {
            if cancel.is_cancelled() {
                info!(%run_id, offset, "Batch run cancelled");
                summary.stop_reason = StopReason::Cancelled;
                break;
            }
            if self
                .settings
                .max_batches
                .is_some_and(|max| summary.batches_written >= max)
            {
                info!(%run_id, offset, "Batch limit reached");
                summary.stop_reason = StopReason::BatchLimit;
                break;
            }

            let reader = self.reader.clone();
            let window = blocking(move || Ok(reader.read_window(batch_size, offset))).await?;

            if window.rows_read == 0 {
                info!(%run_id, offset, "No more rows in source");
                break;
            }

            info!(
                %run_id,
                from = offset,
                to = offset + window.rows_read,
                records = window.records.len(),
                "Processing batch"
            );

            let mut rows = Vec::with_capacity(window.records.len());
            for (i, record) in window.records.iter().enumerate() {
                if !first_call {
                    tokio::time::sleep(self.settings.request_delay).await;
                }
                first_call = false;

                let skills = self.extractor.extract(&record.cleaned_text, None).await;
                if skills.is_empty() {
                    warn!(vacancy_id = record.id, "No skills extracted");
                }
                tracing::debug!(
                    vacancy_id = record.id,
                    position = i + 1,
                    of = window.records.len(),
                    "Vacancy processed"
                );

                rows.push(ArtifactRow::new(
                    record.id,
                    skills.hard_joined(),
                    skills.soft_joined(),
                ));
            }

            let end = offset + window.rows_read;
            let record_count = rows.len();
            let store = store.clone();
            blocking(move || store.write_batch(end, &rows))
                .await
                .inspect_err(|e| error!(%run_id, offset = end, "Failed to persist batch: {e}"))?;

            offset = end;
            summary.end_offset = end;
            summary.batches_written += 1;
            summary.records_processed += record_count;

            let progress = offset as f64 / total_rows as f64 * 100.0;
            info!(%run_id, offset, total_rows, "Progress: {progress:.1}%");
        }

        summary.finished_at = Utc::now();
        info!(
            %run_id,
            batches = summary.batches_written,
            records = summary.records_processed,
            reason = ?summary.stop_reason,
            "Batch run finished"
        );
        Ok(summary)
    }
}
