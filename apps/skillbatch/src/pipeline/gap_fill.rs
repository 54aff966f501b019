//! Gap filling: re-queries only the missing skill category for merged rows that
//! came back partial, and patches the merged and reconciled outputs.
//!
//! Retry policy per row: up to `max_attempts` extraction calls. An attempt is
//! accepted as soon as it supplies at least one of the missing categories; the
//! final attempt is accepted whatever it returns, so every row terminates. Rows
//! that end with nothing new are recorded in `gap_fill_unresolved.json` for
//! manual review. That file accumulates across runs and later runs skip the
//! ids it lists unless asked to retry them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::extraction::SkillExtractor;
use crate::models::skills::{join_skills, SkillResult};
use crate::pipeline::merge::{GapRow, MergeEngine, MergedResultSet, ReconciledOutput};
use crate::pipeline::{blocking, PipelineError};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Patched outputs are written back after this many rows.
const FLUSH_EVERY: usize = 10;

#[derive(Debug, Clone)]
pub struct GapFillSettings {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub request_delay: Duration,
    pub limit: Option<usize>,
    /// Include rows a previous run left unresolved.
    pub retry_unresolved: bool,
}

/// Outcome of the retry loop for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub result: SkillResult,
    pub attempts: u32,
    /// True when the accepted result supplied at least one missing category.
    pub resolved: bool,
}

/// A row no attempt could fill. `attempts` totals every run that tried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRow {
    pub id: u64,
    pub attempts: u32,
}

/// Reads the unresolved ledger; a missing file is an empty ledger.
pub fn load_unresolved(path: &Path) -> Result<Vec<UnresolvedRow>, PipelineError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Folds one run into the ledger: resolved ids leave it, new failures join
/// it, and repeated failures add to their attempt count. Sorted by id.
pub fn merge_unresolved(
    previous: Vec<UnresolvedRow>,
    resolved: &HashSet<u64>,
    failed: &[UnresolvedRow],
) -> Vec<UnresolvedRow> {
    let mut ledger: BTreeMap<u64, u32> = previous.into_iter().map(|r| (r.id, r.attempts)).collect();
    for id in resolved {
        ledger.remove(id);
    }
    for row in failed {
        *ledger.entry(row.id).or_insert(0) += row.attempts;
    }
    ledger
        .into_iter()
        .map(|(id, attempts)| UnresolvedRow { id, attempts })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct GapFillReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_found: usize,
    /// Previously unresolved ids left out of this run.
    pub rows_skipped: usize,
    pub rows_processed: usize,
    pub rows_filled: usize,
    pub rows_unresolved: usize,
    pub attempts: u32,
    pub cancelled: bool,
    pub unresolved: Vec<UnresolvedRow>,
}

fn supplies_missing(gap: &GapRow, result: &SkillResult) -> bool {
    (gap.missing_hard() && !result.hard.is_empty())
        || (gap.missing_soft() && !result.soft.is_empty())
}

/// Queries the extractor for one gap row under the retry policy.
pub async fn fill_gap(
    extractor: &dyn SkillExtractor,
    gap: &GapRow,
    max_attempts: u32,
    backoff: Duration,
) -> AttemptOutcome {
    let max_attempts = max_attempts.max(1);
    let filter = gap.category_filter();

    let mut attempt = 1;
    loop {
        let result = extractor.extract(&gap.cleaned_text, filter).await;
        let resolved = supplies_missing(gap, &result);

        if resolved || attempt >= max_attempts {
            debug!(vacancy_id = gap.id, attempt, resolved, "Gap attempt accepted");
            return AttemptOutcome {
                result,
                attempts: attempt,
                resolved,
            };
        }

        debug!(vacancy_id = gap.id, attempt, "Gap attempt returned nothing missing, retrying");
        tokio::time::sleep(backoff).await;
        attempt += 1;
    }
}

/// New (hard, soft) cells: the missing sides take the fresh result when it has
/// one, populated sides keep their current value.
pub fn patched_values(gap: &GapRow, result: &SkillResult) -> (String, String) {
    let hard = if gap.missing_hard() && !result.hard.is_empty() {
        join_skills(&result.hard)
    } else {
        gap.current_hard.clone()
    };
    let soft = if gap.missing_soft() && !result.soft.is_empty() {
        join_skills(&result.soft)
    } else {
        gap.current_soft.clone()
    };
    (hard, soft)
}

pub struct GapFiller {
    engine: MergeEngine,
    extractor: Arc<dyn SkillExtractor>,
    settings: GapFillSettings,
}

impl GapFiller {
    pub fn new(
        engine: MergeEngine,
        extractor: Arc<dyn SkillExtractor>,
        settings: GapFillSettings,
    ) -> Self {
        Self {
            engine,
            extractor,
            settings,
        }
    }

    /// Processes every gap row (or up to `limit`), stopping early at a row
    /// boundary once `cancel` fires. Patched data is flushed periodically and
    /// on exit.
    pub async fn run(&self, cancel: CancellationToken) -> Result<GapFillReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let engine = self.engine.clone();
        let limit = self.settings.limit;
        let retry_unresolved = self.settings.retry_unresolved;
        let (gaps, skipped, mut merged, mut reconciled) = blocking(move || {
            let skip: HashSet<u64> = if retry_unresolved {
                HashSet::new()
            } else {
                load_unresolved(&engine.store().unresolved_path())?
                    .into_iter()
                    .map(|r| r.id)
                    .collect()
            };
            let gaps = engine.find_partial_gaps(limit, &skip)?;
            let merged = engine.load_merged()?;
            let reconciled = engine.load_reconciled()?;
            Ok((gaps, skip.len(), merged, reconciled))
        })
        .await?;

        info!(
            %run_id,
            gaps = gaps.len(),
            skipped,
            reconciled = reconciled.is_some(),
            "Gap fill starting"
        );

        let mut report = GapFillReport {
            run_id,
            started_at,
            finished_at: started_at,
            rows_found: gaps.len(),
            rows_skipped: skipped,
            rows_processed: 0,
            rows_filled: 0,
            rows_unresolved: 0,
            attempts: 0,
            cancelled: false,
            unresolved: Vec::new(),
        };
        let mut resolved: HashSet<u64> = HashSet::new();
        let mut pending: HashMap<u64, (String, String)> = HashMap::new();

        for (n, gap) in gaps.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(%run_id, processed = n, "Gap fill cancelled");
                report.cancelled = true;
                break;
            }
            if n > 0 {
                tokio::time::sleep(self.settings.request_delay).await;
            }

            let outcome = fill_gap(
                self.extractor.as_ref(),
                gap,
                self.settings.max_attempts,
                self.settings.backoff,
            )
            .await;
            report.attempts += outcome.attempts;

            let (new_hard, new_soft) = patched_values(gap, &outcome.result);
            if !merged.patch_cell(gap.row_index, &new_hard, &new_soft) {
                warn!(vacancy_id = gap.id, row = gap.row_index, "Gap row index out of range");
            }
            if let Some(output) = reconciled.as_mut() {
                output.patch(
                    gap.id,
                    &gap.current_hard,
                    &gap.current_soft,
                    &new_hard,
                    &new_soft,
                );
            }

            report.rows_processed += 1;
            if outcome.resolved {
                report.rows_filled += 1;
                resolved.insert(gap.id);
                pending.insert(gap.id, (new_hard, new_soft));
            } else {
                warn!(
                    vacancy_id = gap.id,
                    attempts = outcome.attempts,
                    "No missing skills recovered, keeping existing values"
                );
                report.rows_unresolved += 1;
                report.unresolved.push(UnresolvedRow {
                    id: gap.id,
                    attempts: outcome.attempts,
                });
            }

            if report.rows_processed % FLUSH_EVERY == 0 {
                (merged, reconciled) = self
                    .flush(std::mem::take(&mut pending), merged, reconciled)
                    .await?;
                info!(
                    %run_id,
                    processed = report.rows_processed,
                    total = gaps.len(),
                    "Gap fill progress"
                );
            }
        }

        if report.rows_processed % FLUSH_EVERY != 0 {
            self.flush(pending, merged, reconciled).await?;
        }

        report.finished_at = Utc::now();
        let path = self.engine.store().unresolved_path();
        let failed = report.unresolved.clone();
        let ledger_size = blocking(move || {
            let ledger = merge_unresolved(load_unresolved(&path)?, &resolved, &failed);
            std::fs::write(&path, serde_json::to_vec_pretty(&ledger)?)?;
            Ok(ledger.len())
        })
        .await?;

        info!(
            %run_id,
            processed = report.rows_processed,
            filled = report.rows_filled,
            unresolved = report.rows_unresolved,
            ledger = ledger_size,
            "Gap fill finished"
        );
        Ok(report)
    }

    /// Writes `patches` through to the artifacts, then saves both outputs.
    async fn flush(
        &self,
        patches: HashMap<u64, (String, String)>,
        merged: MergedResultSet,
        reconciled: Option<ReconciledOutput>,
    ) -> Result<(MergedResultSet, Option<ReconciledOutput>), PipelineError> {
        let engine = self.engine.clone();
        blocking(move || {
            engine.patch_artifacts(&patches)?;
            engine.save_merged(&merged)?;
            if let Some(output) = &reconciled {
                engine.save_reconciled(output)?;
            }
            Ok((merged, reconciled))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skills::SkillCategory;
    use crate::pipeline::artifacts::{ArtifactRow, ArtifactStore};
    use crate::pipeline::test_support::{FixedExtractor, ScriptedExtractor};
    use crate::source::test_support::write_source;
    use crate::source::SourceReader;
    use tempfile::TempDir;

    fn gap(hard: &str, soft: &str) -> GapRow {
        GapRow {
            id: 1,
            cleaned_text: "Python developer".into(),
            row_index: 0,
            current_hard: hard.into(),
            current_soft: soft.into(),
        }
    }

    fn result(hard: &[&str], soft: &[&str]) -> SkillResult {
        SkillResult {
            hard: hard.iter().map(|s| s.to_string()).collect(),
            soft: soft.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn settings() -> GapFillSettings {
        GapFillSettings {
            max_attempts: 5,
            backoff: Duration::ZERO,
            request_delay: Duration::ZERO,
            limit: None,
            retry_unresolved: false,
        }
    }

    fn engine(dir: &TempDir) -> MergeEngine {
        MergeEngine::new(
            ArtifactStore::new(dir.path().join("process_vacs")),
            SourceReader::new(write_source(dir.path(), 10)),
        )
    }

    #[tokio::test]
    async fn test_fill_gap_requests_only_missing_category() {
        let extractor = FixedExtractor::new(&["Python"], &["teamwork"]);
        let outcome = fill_gap(&extractor, &gap("", "calm"), 5, Duration::ZERO).await;

        assert!(outcome.resolved);
        assert_eq!(outcome.attempts, 1);
        let calls = extractor.calls.lock().unwrap();
        assert_eq!(calls[0].1, Some(SkillCategory::Hard));
    }

    #[tokio::test]
    async fn test_fill_gap_requests_both_when_both_missing() {
        let extractor = FixedExtractor::new(&["Python"], &[]);
        let outcome = fill_gap(&extractor, &gap("", ""), 5, Duration::ZERO).await;

        assert!(outcome.resolved);
        assert_eq!(extractor.calls.lock().unwrap()[0].1, None);
    }

    #[tokio::test]
    async fn test_fill_gap_retries_until_missing_side_arrives() {
        let extractor = ScriptedExtractor::new(vec![
            result(&[], &[]),
            result(&[], &["ignored, not missing"]),
            result(&["Docker"], &[]),
        ]);
        let outcome = fill_gap(&extractor, &gap("", "calm"), 5, Duration::ZERO).await;

        assert!(outcome.resolved);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.hard, vec!["Docker"]);
    }

    #[tokio::test]
    async fn test_fill_gap_terminates_on_permanent_failure() {
        let extractor = ScriptedExtractor::new(Vec::new());
        let outcome = fill_gap(&extractor, &gap("", ""), 5, Duration::ZERO).await;

        assert!(!outcome.resolved);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(extractor.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_gap_waits_backoff_between_failures() {
        let extractor = ScriptedExtractor::new(Vec::new());
        let start = tokio::time::Instant::now();
        fill_gap(&extractor, &gap("", ""), 3, Duration::from_secs(2)).await;

        // Two waits between three attempts, none after the last.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[test]
    fn test_patched_values_keep_populated_side() {
        let (hard, soft) = patched_values(&gap("", "calm"), &result(&["Python"], &["other"]));
        assert_eq!(hard, "Python");
        assert_eq!(soft, "calm");

        let (hard, soft) = patched_values(&gap("Go", ""), &result(&[], &[]));
        assert_eq!(hard, "Go");
        assert_eq!(soft, "");
    }

    #[tokio::test]
    async fn test_run_patches_merged_and_reconciled_outputs() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine
            .store()
            .write_batch(
                3,
                &[
                    ArtifactRow::new(1, "Rust", "calm"),
                    ArtifactRow::new(2, "", "focus"),
                    ArtifactRow::new(3, "Go", ""),
                ],
            )
            .unwrap();
        engine.merge_all().unwrap();
        engine.merge_with_source().unwrap();

        let extractor = Arc::new(FixedExtractor::new(&["Python"], &["teamwork"]));
        let filler = GapFiller::new(engine.clone(), extractor.clone(), settings());
        let report = filler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.rows_found, 2);
        assert_eq!(report.rows_filled, 2);
        assert_eq!(report.attempts, 2);

        let merged = engine.load_merged().unwrap();
        assert_eq!(merged.rows[0], ArtifactRow::new(1, "Rust", "calm"));
        assert_eq!(merged.rows[1], ArtifactRow::new(2, "Python", "focus"));
        assert_eq!(merged.rows[2], ArtifactRow::new(3, "Go", "teamwork"));

        let output = engine.load_reconciled().unwrap().unwrap();
        assert_eq!(
            output.skills_of(2),
            Some(("Python".to_string(), "focus".to_string()))
        );
        assert!(engine.find_partial_gaps(None, &HashSet::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_records_unresolved_rows() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine
            .store()
            .write_batch(1, &[ArtifactRow::new(4, "", "")])
            .unwrap();
        engine.merge_all().unwrap();

        let extractor = Arc::new(ScriptedExtractor::new(Vec::new()));
        let filler = GapFiller::new(engine.clone(), extractor.clone(), settings());
        let report = filler.run(CancellationToken::new()).await.unwrap();

        assert_eq!(report.rows_processed, 1);
        assert_eq!(report.rows_unresolved, 1);
        assert_eq!(extractor.call_count(), 5);
        assert_eq!(engine.load_merged().unwrap().rows[0], ArtifactRow::new(4, "", ""));

        let saved: serde_json::Value =
            serde_json::from_slice(&std::fs::read(engine.store().unresolved_path()).unwrap())
                .unwrap();
        assert_eq!(saved[0]["id"], 4);
        assert_eq!(saved[0]["attempts"], 5);
    }

    #[tokio::test]
    async fn test_run_honours_limit_and_cancellation() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let rows: Vec<ArtifactRow> = (1..=6).map(|id| ArtifactRow::new(id, "", "x")).collect();
        engine.store().write_batch(6, &rows).unwrap();
        engine.merge_all().unwrap();

        let extractor = Arc::new(FixedExtractor::new(&["Python"], &[]));
        let mut s = settings();
        s.limit = Some(2);
        let report = GapFiller::new(engine.clone(), extractor.clone(), s)
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.rows_processed, 2);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = GapFiller::new(engine.clone(), extractor.clone(), settings())
            .run(cancel)
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.rows_processed, 0);
        assert_eq!(engine.find_partial_gaps(None, &HashSet::new()).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_filled_cells_survive_a_later_merge() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine
            .store()
            .write_batch(2, &[ArtifactRow::new(1, "", "calm"), ArtifactRow::new(2, "Go", "x")])
            .unwrap();
        engine.merge_all().unwrap();
        engine.merge_with_source().unwrap();

        let extractor = Arc::new(FixedExtractor::new(&["Python"], &[]));
        GapFiller::new(engine.clone(), extractor, settings())
            .run(CancellationToken::new())
            .await
            .unwrap();

        let (output, _) = engine.merge_with_source().unwrap();
        assert_eq!(
            output.skills_of(1),
            Some(("Python".to_string(), "calm".to_string()))
        );
        assert_eq!(
            engine.load_merged().unwrap().rows[0],
            ArtifactRow::new(1, "Python", "calm")
        );

        let (merged, _) = engine.merge_all().unwrap();
        assert_eq!(merged.rows[0], ArtifactRow::new(1, "Python", "calm"));
        assert_eq!(
            engine.store().read_artifact(2).unwrap()[0],
            ArtifactRow::new(1, "Python", "calm")
        );
    }

    #[tokio::test]
    async fn test_limited_runs_move_past_unresolved_rows() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let rows: Vec<ArtifactRow> = (1..=4).map(|id| ArtifactRow::new(id, "", "")).collect();
        engine.store().write_batch(4, &rows).unwrap();
        engine.merge_all().unwrap();

        let mut s = settings();
        s.max_attempts = 1;
        s.limit = Some(2);
        let extractor = Arc::new(ScriptedExtractor::new(Vec::new()));
        let run = || GapFiller::new(engine.clone(), extractor.clone(), s.clone());
        let ids = |report: &GapFillReport| -> Vec<u64> {
            report.unresolved.iter().map(|r| r.id).collect()
        };

        let first = run().run(CancellationToken::new()).await.unwrap();
        assert_eq!(ids(&first), vec![1, 2]);

        let second = run().run(CancellationToken::new()).await.unwrap();
        assert_eq!(ids(&second), vec![3, 4]);
        assert_eq!(second.rows_skipped, 2);

        let third = run().run(CancellationToken::new()).await.unwrap();
        assert_eq!(third.rows_processed, 0);
        assert_eq!(extractor.call_count(), 4);

        let ledger = load_unresolved(&engine.store().unresolved_path()).unwrap();
        let ledger_ids: Vec<u64> = ledger.iter().map(|r| r.id).collect();
        assert_eq!(ledger_ids, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_retry_unresolved_includes_and_clears_them() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        engine
            .store()
            .write_batch(2, &[ArtifactRow::new(1, "", "calm"), ArtifactRow::new(2, "", "x")])
            .unwrap();
        engine.merge_all().unwrap();

        let mut s = settings();
        s.max_attempts = 2;
        GapFiller::new(engine.clone(), Arc::new(ScriptedExtractor::new(Vec::new())), s.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();

        // Without the flag the rows stay skipped.
        let extractor = Arc::new(FixedExtractor::new(&["Python"], &[]));
        let skipped = GapFiller::new(engine.clone(), extractor.clone(), s.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(skipped.rows_found, 0);
        assert_eq!(extractor.call_count(), 0);

        // A failing retry adds to the attempt count.
        s.retry_unresolved = true;
        s.limit = Some(1);
        GapFiller::new(engine.clone(), Arc::new(ScriptedExtractor::new(Vec::new())), s.clone())
            .run(CancellationToken::new())
            .await
            .unwrap();
        let ledger = load_unresolved(&engine.store().unresolved_path()).unwrap();
        assert_eq!(
            ledger,
            vec![
                UnresolvedRow { id: 1, attempts: 4 },
                UnresolvedRow { id: 2, attempts: 2 },
            ]
        );

        s.limit = None;
        let report = GapFiller::new(engine.clone(), extractor.clone(), s)
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.rows_filled, 2);
        assert!(load_unresolved(&engine.store().unresolved_path())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_merge_unresolved_folds_one_run() {
        let previous = vec![
            UnresolvedRow { id: 3, attempts: 5 },
            UnresolvedRow { id: 7, attempts: 5 },
        ];
        let resolved = HashSet::from([7]);
        let failed = [UnresolvedRow { id: 3, attempts: 2 }, UnresolvedRow { id: 1, attempts: 5 }];

        assert_eq!(
            merge_unresolved(previous, &resolved, &failed),
            vec![
                UnresolvedRow { id: 1, attempts: 5 },
                UnresolvedRow { id: 3, attempts: 7 },
            ]
        );
    }

    #[test]
    fn test_load_unresolved_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(load_unresolved(&dir.path().join("absent.json")).unwrap().is_empty());

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(load_unresolved(&path).is_err());
    }

    #[tokio::test]
    async fn test_run_without_merged_file_fails() {
        let dir = TempDir::new().unwrap();
        let filler = GapFiller::new(
            engine(&dir),
            Arc::new(FixedExtractor::default()),
            settings(),
        );
        let err = filler.run(CancellationToken::new()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
