use serde::Serialize;
use serde_json::json;

use crate::control::CommandReply;
use crate::errors::AppError;
use crate::pipeline::artifacts::artifact_name;
use crate::pipeline::blocking;
use crate::pipeline::gap_fill::GapFillReport;
use crate::pipeline::runner::RunSummary;
use crate::pipeline::stats::SkillStatistics;
use crate::pipeline::supervisor::{StartOutcome, StopOutcome, WorkerState};
use crate::state::AppState;

const RECENT_ARTIFACTS: usize = 5;

pub const COMMANDS: &[(&str, &str)] = &[
    ("GET /api/v1/progress", "Batch progress and worker states"),
    ("POST /api/v1/processing/start", "Start batch extraction from the resume offset"),
    ("POST /api/v1/processing/stop", "Stop batch extraction after the current batch"),
    ("POST /api/v1/merge", "Merge all batch artifacts into merged_results.csv"),
    ("POST /api/v1/merge/source", "Join the batch artifacts onto the source table"),
    (
        "POST /api/v1/gap-fill/start",
        "Re-query missing skills, optional {\"limit\": n, \"retry_unresolved\": bool}",
    ),
    ("POST /api/v1/gap-fill/stop", "Stop gap filling after the current row"),
    ("GET /api/v1/statistics", "Skill statistics over the merged results"),
    ("GET /api/v1/artifacts/:offset", "Download the artifact covering an offset"),
];

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub runner: WorkerState,
    pub gap_filler: WorkerState,
    pub covered_offset: usize,
    pub total_rows: usize,
    pub records_written: usize,
    pub batch_size: usize,
    pub percent: f64,
    pub artifact_count: usize,
    pub recent_artifacts: Vec<String>,
    pub last_run: Option<RunSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatisticsReport {
    #[serde(flatten)]
    pub skills: SkillStatistics,
    pub last_gap_fill: Option<GapFillReport>,
}

pub fn help() -> CommandReply {
    let lines: Vec<String> = COMMANDS
        .iter()
        .map(|(route, what)| format!("{route}: {what}"))
        .collect();
    CommandReply::message(lines.join("\n")).with_data(&json!({
        "commands": COMMANDS
            .iter()
            .map(|(route, what)| json!({"route": route, "description": what}))
            .collect::<Vec<_>>()
    }))
}

pub async fn progress(state: &AppState) -> Result<CommandReply, AppError> {
    let store = state.store.clone();
    let reader = state.reader.clone();
    let (covered_offset, offsets, records_written, total_rows) = blocking(move || {
        Ok((
            store.resume_offset()?,
            store.list_offsets()?,
            store.processed_rows()?,
            reader.total_rows(),
        ))
    })
    .await?;

    let percent = if total_rows == 0 {
        0.0
    } else {
        (covered_offset as f64 / total_rows as f64 * 100.0).min(100.0)
    };
    let recent_artifacts = offsets
        .iter()
        .rev()
        .take(RECENT_ARTIFACTS)
        .rev()
        .map(|&o| artifact_name(o))
        .collect();

    let report = ProgressReport {
        runner: state.supervisor.runner_state(),
        gap_filler: state.supervisor.gap_fill_state(),
        covered_offset,
        total_rows,
        records_written,
        batch_size: state.config.batch_size,
        percent,
        artifact_count: offsets.len(),
        recent_artifacts,
        last_run: state.supervisor.last_run(),
    };

    let message = format!(
        "Processed {covered_offset} of {total_rows} rows ({percent:.1}%), {} artifacts. Runner: {:?}, gap filler: {:?}",
        report.artifact_count, report.runner, report.gap_filler
    );
    Ok(CommandReply::message(message).with_data(&report))
}

pub fn start_processing(state: &AppState) -> Result<CommandReply, AppError> {
    if state.supervisor.gap_fill_state().is_active() {
        return Err(AppError::Conflict(
            "Gap filling is running; stop it before starting batch processing".into(),
        ));
    }
    Ok(match state.supervisor.start_processing() {
        StartOutcome::Started => CommandReply::message("Batch processing started"),
        StartOutcome::AlreadyRunning => CommandReply::message("Batch processing is already running"),
    })
}

pub fn stop_processing(state: &AppState) -> CommandReply {
    match state.supervisor.stop_processing() {
        StopOutcome::Stopping => {
            CommandReply::message("Batch processing will stop after the current batch")
        }
        StopOutcome::NotRunning => CommandReply::message("Batch processing is not running"),
    }
}

fn ensure_no_gap_fill(state: &AppState) -> Result<(), AppError> {
    if state.supervisor.gap_fill_state().is_active() {
        return Err(AppError::Conflict(
            "Gap filling is rewriting the merged files; stop it first".into(),
        ));
    }
    Ok(())
}

pub async fn merge_batches(state: &AppState) -> Result<CommandReply, AppError> {
    ensure_no_gap_fill(state)?;
    let engine = state.merge_engine();
    let (_, report) = blocking(move || engine.merge_all()).await?;

    let message = format!(
        "Merged {} artifacts into {} rows",
        report.artifacts, report.rows
    );
    Ok(CommandReply::message(message).with_data(&report))
}

pub async fn merge_with_source(state: &AppState) -> Result<CommandReply, AppError> {
    ensure_no_gap_fill(state)?;
    let engine = state.merge_engine();
    let (_, report) = blocking(move || engine.merge_with_source()).await?;

    let message = format!("Joined {} processed rows with the source table", report.rows);
    Ok(CommandReply::message(message).with_data(&report))
}

pub fn start_gap_fill(
    state: &AppState,
    limit: Option<usize>,
    retry_unresolved: bool,
) -> Result<CommandReply, AppError> {
    if limit == Some(0) {
        return Err(AppError::Validation("limit must be greater than zero".into()));
    }
    if state.supervisor.runner_state().is_active() {
        return Err(AppError::Conflict(
            "Batch processing is running; wait for it to finish before gap filling".into(),
        ));
    }
    if !state.store.merged_path().is_file() {
        return Err(AppError::NotFound(
            "Merged results not found, run merge first".into(),
        ));
    }

    Ok(match state.supervisor.start_gap_fill(limit, retry_unresolved) {
        StartOutcome::Started => match limit {
            Some(n) => CommandReply::message(format!("Gap filling started (up to {n} rows)")),
            None => CommandReply::message("Gap filling started"),
        },
        StartOutcome::AlreadyRunning => CommandReply::message("Gap filling is already running"),
    })
}

pub fn stop_gap_fill(state: &AppState) -> CommandReply {
    match state.supervisor.stop_gap_fill() {
        StopOutcome::Stopping => CommandReply::message("Gap filling will stop after the current row"),
        StopOutcome::NotRunning => CommandReply::message("Gap filling is not running"),
    }
}

pub async fn statistics(state: &AppState) -> Result<CommandReply, AppError> {
    let engine = state.merge_engine();
    let merged = blocking(move || engine.load_merged()).await?;
    let report = StatisticsReport {
        skills: SkillStatistics::from_merged(&merged),
        last_gap_fill: state.supervisor.last_gap_fill(),
    };

    let s = &report.skills;
    let message = format!(
        "{} rows: {} with both ({:.1}%), {} hard only, {} soft only, {} with neither",
        s.total_rows,
        s.with_both,
        s.completeness(),
        s.hard_only,
        s.soft_only,
        s.with_neither
    );
    Ok(CommandReply::message(message).with_data(&report))
}

/// The artifact covering `offset` (rounded up to the next batch boundary),
/// as its file name and raw CSV bytes.
pub async fn fetch_artifact(state: &AppState, offset: usize) -> Result<(String, Vec<u8>), AppError> {
    let store = state.store.clone();
    let found = blocking(move || match store.artifact_covering(offset)? {
        Some(covering) => Ok(Some((
            artifact_name(covering),
            std::fs::read(store.artifact_path(covering))?,
        ))),
        None => Ok(None),
    })
    .await?;

    found.ok_or_else(|| AppError::NotFound(format!("No artifact covers offset {offset}")))
}
