//! Merge & Reconciliation Engine.
//!
//! `merge_all` concatenates the batch artifacts into `merged_results.csv`;
//! `merge_with_source` inner-joins the same concatenation back onto the source
//! table and writes `merged_with_original.xlsx`. Gap discovery and the two
//! patch operations work on those persisted outputs. Gap-fill patches are also
//! written through to the artifacts, which stay the source of truth for any
//! later merge.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::models::skills::{is_blank_cell, SkillCategory};
use crate::pipeline::artifacts::{read_rows, write_rows_atomic, ArtifactRow, ArtifactStore};
use crate::pipeline::PipelineError;
use crate::source::table::{read_table, write_spreadsheet, Cell, Table};
use crate::source::{SourceReader, ID_COLUMN};

pub const HARD_COLUMN: &str = "hard_skills";
pub const SOFT_COLUMN: &str = "soft_skills";

/// Every processed row across all artifacts, in artifact order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedResultSet {
    pub rows: Vec<ArtifactRow>,
}

impl MergedResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Overwrites both skill columns of the row at `index`. Returns false when
    /// the index is out of range. Callers pass the existing value through for a
    /// side they do not mean to change.
    pub fn patch_cell(&mut self, index: usize, hard_skills: &str, soft_skills: &str) -> bool {
        match self.rows.get_mut(index) {
            Some(row) => {
                row.hard_skills = hard_skills.to_string();
                row.soft_skills = soft_skills.to_string();
                true
            }
            None => false,
        }
    }
}

/// Source rows joined with their extracted skills.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledOutput {
    pub table: Table,
    id_col: usize,
    hard_col: usize,
    soft_col: usize,
}

impl ReconciledOutput {
    pub fn from_table(table: Table) -> Result<Self, PipelineError> {
        let id_col = table.require_column(ID_COLUMN)?;
        let hard_col = table.require_column(HARD_COLUMN)?;
        let soft_col = table.require_column(SOFT_COLUMN)?;
        Ok(Self {
            table,
            id_col,
            hard_col,
            soft_col,
        })
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        Self::from_table(read_table(path)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        write_spreadsheet(&self.table, path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn row_of(&self, id: u64) -> Option<usize> {
        (0..self.table.len()).find(|&row| self.table.cell(row, self.id_col).as_id() == Some(id))
    }

    /// Current (hard, soft) cells for `id`.
    #[cfg(test)]
    pub fn skills_of(&self, id: u64) -> Option<(String, String)> {
        let row = self.row_of(id)?;
        Some((
            self.table.cell(row, self.hard_col).to_string(),
            self.table.cell(row, self.soft_col).to_string(),
        ))
    }

    /// Fills a skill column of row `id` only when the caller saw it empty and
    /// it is still empty here. A populated cell is never overwritten, so a
    /// repeated or stale patch is harmless. Returns false if `id` is absent.
    pub fn patch(
        &mut self,
        id: u64,
        previous_hard: &str,
        previous_soft: &str,
        new_hard: &str,
        new_soft: &str,
    ) -> bool {
        let Some(row) = self.row_of(id) else {
            return false;
        };

        for (col, previous, new) in [
            (self.hard_col, previous_hard, new_hard),
            (self.soft_col, previous_soft, new_soft),
        ] {
            let current = self.table.cell(row, col).to_string();
            if is_blank_cell(previous) && is_blank_cell(&current) && !is_blank_cell(new) {
                self.table.set_cell(row, col, Cell::Text(new.to_string()));
            }
        }
        true
    }
}

/// A merged row with at least one skill category missing, plus what the
/// gap filler needs to re-query it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GapRow {
    pub id: u64,
    pub cleaned_text: String,
    pub row_index: usize,
    pub current_hard: String,
    pub current_soft: String,
}

impl GapRow {
    pub fn missing_hard(&self) -> bool {
        is_blank_cell(&self.current_hard)
    }

    pub fn missing_soft(&self) -> bool {
        is_blank_cell(&self.current_soft)
    }

    /// Category to request: just the missing one, or both (`None`).
    pub fn category_filter(&self) -> Option<SkillCategory> {
        match (self.missing_hard(), self.missing_soft()) {
            (true, false) => Some(SkillCategory::Hard),
            (false, true) => Some(SkillCategory::Soft),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub artifacts: usize,
    pub rows: usize,
    pub duplicates_dropped: usize,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub rows: usize,
    pub unmatched_ids: usize,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct MergeEngine {
    store: ArtifactStore,
    reader: SourceReader,
}

impl MergeEngine {
    pub fn new(store: ArtifactStore, reader: SourceReader) -> Self {
        Self { store, reader }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Concatenates every artifact in offset order. Should an id appear in more
    /// than one artifact, the later artifact wins. Nothing is written.
    fn concat_artifacts(&self) -> Result<(MergedResultSet, MergeReport), PipelineError> {
        let offsets = self.store.list_offsets()?;
        if offsets.is_empty() {
            return Err(PipelineError::NoArtifacts(
                self.store.dir().display().to_string(),
            ));
        }

        let mut rows: Vec<ArtifactRow> = Vec::new();
        let mut position: HashMap<u64, usize> = HashMap::new();
        let mut duplicates_dropped = 0;

        for offset in &offsets {
            for row in read_rows(&self.store.artifact_path(*offset))? {
                match position.get(&row.id) {
                    Some(&idx) => {
                        warn!(vacancy_id = row.id, artifact = offset, "Duplicate id across artifacts");
                        rows[idx] = row;
                        duplicates_dropped += 1;
                    }
                    None => {
                        position.insert(row.id, rows.len());
                        rows.push(row);
                    }
                }
            }
        }

        let report = MergeReport {
            artifacts: offsets.len(),
            rows: rows.len(),
            duplicates_dropped,
            path: self.store.merged_path().display().to_string(),
        };
        Ok((MergedResultSet { rows }, report))
    }

    /// Concatenates every artifact and persists the result as the merged file.
    pub fn merge_all(&self) -> Result<(MergedResultSet, MergeReport), PipelineError> {
        let (merged, report) = self.concat_artifacts()?;
        write_rows_atomic(&self.store.merged_path(), &merged.rows)?;

        info!(
            artifacts = report.artifacts,
            rows = report.rows,
            "Merged batch artifacts"
        );
        Ok((merged, report))
    }

    /// Concatenates the artifacts in memory, then keeps exactly the source rows
    /// whose id was processed, appending the two skill columns. Unprocessed
    /// rows are absent. The merged file is left as it is.
    pub fn merge_with_source(&self) -> Result<(ReconciledOutput, ReconcileReport), PipelineError> {
        let (merged, _) = self.concat_artifacts()?;
        if merged.is_empty() {
            warn!("Batch artifacts hold no rows");
        }
        let skills: HashMap<u64, &ArtifactRow> = merged.rows.iter().map(|r| (r.id, r)).collect();

        let source = self.reader.load_table()?;
        let id_col = source.require_column(ID_COLUMN)?;

        // Source columns that collide with the skill columns are replaced.
        let keep: Vec<usize> = (0..source.headers.len())
            .filter(|&c| {
                let h = source.headers[c].trim();
                h != HARD_COLUMN && h != SOFT_COLUMN
            })
            .collect();

        let mut headers: Vec<String> = keep.iter().map(|&c| source.headers[c].clone()).collect();
        headers.push(HARD_COLUMN.to_string());
        headers.push(SOFT_COLUMN.to_string());

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for row_idx in 0..source.len() {
            let Some(id) = source.cell(row_idx, id_col).as_id() else {
                continue;
            };
            let Some(result) = skills.get(&id) else {
                continue;
            };
            if !seen.insert(id) {
                continue;
            }

            let mut row: Vec<Cell> = keep
                .iter()
                .map(|&c| source.cell(row_idx, c).clone())
                .collect();
            row.push(Cell::Text(result.hard_skills.clone()));
            row.push(Cell::Text(result.soft_skills.clone()));
            rows.push(row);
        }

        let output = ReconciledOutput::from_table(Table { headers, rows })?;
        if output.is_empty() {
            warn!("No processed id matched a source row");
        }
        let path = self.store.reconciled_path();
        output.save(&path)?;

        let report = ReconcileReport {
            rows: output.len(),
            unmatched_ids: skills.len() - seen.len(),
            path: path.display().to_string(),
        };
        info!(
            rows = report.rows,
            unmatched = report.unmatched_ids,
            "Reconciled results with source"
        );
        Ok((output, report))
    }

    /// Reads the persisted merged file.
    pub fn load_merged(&self) -> Result<MergedResultSet, PipelineError> {
        let path = self.store.merged_path();
        if !path.is_file() {
            return Err(PipelineError::NotFound(
                "Merged results (run merge first)".to_string(),
            ));
        }
        Ok(MergedResultSet {
            rows: read_rows(&path)?,
        })
    }

    pub fn save_merged(&self, merged: &MergedResultSet) -> Result<(), PipelineError> {
        write_rows_atomic(&self.store.merged_path(), &merged.rows)
    }

    /// The reconciled spreadsheet, if one has been produced.
    pub fn load_reconciled(&self) -> Result<Option<ReconciledOutput>, PipelineError> {
        let path = self.store.reconciled_path();
        if !path.is_file() {
            return Ok(None);
        }
        ReconciledOutput::load(&path).map(Some)
    }

    pub fn save_reconciled(&self, output: &ReconciledOutput) -> Result<(), PipelineError> {
        output.save(&self.store.reconciled_path())
    }

    /// Merged rows missing at least one skill category, each with its cleaned
    /// source text. Ids in `exclude` and rows whose id no longer resolves to
    /// text are skipped.
    pub fn find_partial_gaps(
        &self,
        limit: Option<usize>,
        exclude: &HashSet<u64>,
    ) -> Result<Vec<GapRow>, PipelineError> {
        let merged = self.load_merged()?;

        let candidates: Vec<(usize, &ArtifactRow)> = merged
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| is_blank_cell(&r.hard_skills) || is_blank_cell(&r.soft_skills))
            .filter(|(_, r)| !exclude.contains(&r.id))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: HashSet<u64> = candidates.iter().map(|(_, r)| r.id).collect();
        let texts = self.reader.texts_for_ids(&ids)?;

        let mut gaps = Vec::new();
        for (row_index, row) in candidates {
            if limit.is_some_and(|l| gaps.len() >= l) {
                break;
            }
            let Some(text) = texts.get(&row.id) else {
                warn!(vacancy_id = row.id, "Gap row has no source text, skipping");
                continue;
            };
            gaps.push(GapRow {
                id: row.id,
                cleaned_text: text.clone(),
                row_index,
                current_hard: row.hard_skills.clone(),
                current_soft: row.soft_skills.clone(),
            });
        }

        info!(gaps = gaps.len(), "Found rows with missing skills");
        Ok(gaps)
    }

    /// Loads the merged file, patches one row, and writes it back.
    pub fn patch_cell(
        &self,
        row_index: usize,
        hard_skills: &str,
        soft_skills: &str,
    ) -> Result<bool, PipelineError> {
        let mut merged = self.load_merged()?;
        if !merged.patch_cell(row_index, hard_skills, soft_skills) {
            return Ok(false);
        }
        self.save_merged(&merged)?;
        Ok(true)
    }

    /// Fills blank skill cells of the artifact rows named in `patches`, which
    /// maps an id to its new (hard, soft) values. Populated cells are kept.
    /// Only artifacts that change are rewritten; the checkpoint is untouched.
    /// Returns the number of rows changed.
    pub fn patch_artifacts(
        &self,
        patches: &HashMap<u64, (String, String)>,
    ) -> Result<usize, PipelineError> {
        if patches.is_empty() {
            return Ok(0);
        }

        let mut changed = 0;
        for offset in self.store.list_offsets()? {
            let path = self.store.artifact_path(offset);
            let mut rows = read_rows(&path)?;
            let mut dirty = false;
            for row in rows.iter_mut() {
                let Some((hard, soft)) = patches.get(&row.id) else {
                    continue;
                };
                let mut row_changed = false;
                for (cell, new) in [(&mut row.hard_skills, hard), (&mut row.soft_skills, soft)] {
                    if is_blank_cell(cell.as_str()) && !is_blank_cell(new) {
                        *cell = new.clone();
                        row_changed = true;
                    }
                }
                if row_changed {
                    changed += 1;
                    dirty = true;
                }
            }
            if dirty {
                write_rows_atomic(&path, &rows)?;
                debug!(offset, "Artifact patched");
            }
        }
        Ok(changed)
    }

    /// Loads the reconciled spreadsheet, fills empty cells of row `id`, and
    /// writes it back. False when there is no reconciled output or no such id.
    pub fn patch_reconciled(
        &self,
        id: u64,
        previous_hard: &str,
        previous_soft: &str,
        new_hard: &str,
        new_soft: &str,
    ) -> Result<bool, PipelineError> {
        let Some(mut output) = self.load_reconciled()? else {
            return Ok(false);
        };
        let before = output.clone();
        if !output.patch(id, previous_hard, previous_soft, new_hard, new_soft) {
            return Ok(false);
        }
        if output != before {
            self.save_reconciled(&output)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_support::write_source;
    use tempfile::TempDir;

    fn engine(dir: &TempDir, source_rows: usize) -> MergeEngine {
        let reader = SourceReader::new(write_source(dir.path(), source_rows));
        let store = ArtifactStore::new(dir.path().join("process_vacs"));
        MergeEngine::new(store, reader)
    }

    fn seed(engine: &MergeEngine) {
        let store = engine.store();
        store
            .write_batch(
                2,
                &[
                    ArtifactRow::new(1, "Python,SQL", "teamwork"),
                    ArtifactRow::new(2, "", "focus"),
                ],
            )
            .unwrap();
        store
            .write_batch(
                4,
                &[
                    ArtifactRow::new(3, "Go", ""),
                    ArtifactRow::new(4, "", ""),
                ],
            )
            .unwrap();
    }

    #[test]
    fn test_merge_all_concatenates_in_offset_order() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);

        let (merged, report) = engine.merge_all().unwrap();

        assert_eq!(report.artifacts, 2);
        let ids: Vec<u64> = merged.rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(engine.load_merged().unwrap(), merged);
    }

    #[test]
    fn test_merge_all_without_artifacts_fails() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);

        let err = engine.merge_all().unwrap_err();
        assert!(matches!(err, PipelineError::NoArtifacts(_)));
    }

    #[test]
    fn test_merge_all_keeps_ids_unique() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        let store = engine.store();
        store.write_batch(1, &[ArtifactRow::new(1, "", "")]).unwrap();
        store.write_batch(2, &[ArtifactRow::new(1, "Rust", "")]).unwrap();

        let (merged, report) = engine.merge_all().unwrap();
        assert_eq!(merged.rows, vec![ArtifactRow::new(1, "Rust", "")]);
        assert_eq!(report.duplicates_dropped, 1);
    }

    #[test]
    fn test_merge_with_source_is_inner_join() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);

        let (output, report) = engine.merge_with_source().unwrap();

        assert_eq!(report.rows, 4);
        assert_eq!(report.unmatched_ids, 0);
        assert_eq!(
            output.table.headers,
            vec!["id", "title", "description", HARD_COLUMN, SOFT_COLUMN]
        );
        assert_eq!(
            output.skills_of(1),
            Some(("Python,SQL".to_string(), "teamwork".to_string()))
        );
        assert_eq!(output.skills_of(5), None);

        let reloaded = engine.load_reconciled().unwrap().unwrap();
        assert_eq!(reloaded.len(), 4);
        assert_eq!(reloaded.skills_of(3), Some(("Go".to_string(), String::new())));
    }

    #[test]
    fn test_merge_with_source_leaves_merged_file_alone() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);

        engine.merge_with_source().unwrap();
        assert!(!engine.store().merged_path().exists());

        engine.merge_all().unwrap();
        engine.patch_cell(1, "Python", "focus").unwrap();
        engine.merge_with_source().unwrap();
        assert_eq!(
            engine.load_merged().unwrap().rows[1],
            ArtifactRow::new(2, "Python", "focus")
        );
    }

    #[test]
    fn test_merge_with_source_ignores_ids_missing_from_source() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 2);
        engine
            .store()
            .write_batch(
                3,
                &[
                    ArtifactRow::new(1, "Rust", ""),
                    ArtifactRow::new(2, "Go", ""),
                    ArtifactRow::new(77, "C", ""),
                ],
            )
            .unwrap();

        let (output, report) = engine.merge_with_source().unwrap();
        assert_eq!(output.len(), 2);
        assert_eq!(report.unmatched_ids, 1);
    }

    #[test]
    fn test_find_partial_gaps_reports_missing_sides() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);
        engine.merge_all().unwrap();

        let gaps = engine.find_partial_gaps(None, &HashSet::new()).unwrap();
        let ids: Vec<u64> = gaps.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![2, 3, 4]);

        assert_eq!(gaps[0].row_index, 1);
        assert_eq!(gaps[0].category_filter(), Some(SkillCategory::Hard));
        assert_eq!(gaps[1].category_filter(), Some(SkillCategory::Soft));
        assert_eq!(gaps[2].category_filter(), None);
        assert_eq!(gaps[0].cleaned_text, "Vacancy 2 needs Python");
    }

    #[test]
    fn test_find_partial_gaps_honours_limit_and_placeholders() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        engine
            .store()
            .write_batch(
                3,
                &[
                    ArtifactRow::new(1, "nan", "calm"),
                    ArtifactRow::new(2, "Go", "NaN"),
                    ArtifactRow::new(3, "Go", "calm"),
                ],
            )
            .unwrap();
        engine.merge_all().unwrap();

        assert_eq!(engine.find_partial_gaps(None, &HashSet::new()).unwrap().len(), 2);
        assert_eq!(engine.find_partial_gaps(Some(1), &HashSet::new()).unwrap().len(), 1);
    }

    #[test]
    fn test_find_partial_gaps_skips_excluded_ids() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);
        engine.merge_all().unwrap();

        let exclude = HashSet::from([2, 3]);
        let gaps = engine.find_partial_gaps(Some(1), &exclude).unwrap();
        let ids: Vec<u64> = gaps.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![4]);
        assert_eq!(gaps[0].row_index, 3);
    }

    #[test]
    fn test_find_partial_gaps_requires_merged_file() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);

        assert!(engine.find_partial_gaps(None, &HashSet::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_patch_cell_with_passthrough_keeps_populated_side() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);
        engine.merge_all().unwrap();

        // Row 2 had soft "focus" and no hard skills.
        assert!(engine.patch_cell(1, "Python", "focus").unwrap());
        let merged = engine.load_merged().unwrap();
        assert_eq!(merged.rows[1], ArtifactRow::new(2, "Python", "focus"));

        assert!(!engine.patch_cell(99, "x", "y").unwrap());
    }

    #[test]
    fn test_patch_artifacts_fills_blank_cells_only() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);
        let checkpoint = std::fs::read(engine.store().checkpoint_path()).unwrap();

        let patches = HashMap::from([
            (1, ("Java".to_string(), "calm".to_string())),
            (2, ("Python".to_string(), "focus".to_string())),
            (4, ("Rust".to_string(), "nan".to_string())),
        ]);
        assert_eq!(engine.patch_artifacts(&patches).unwrap(), 2);

        let (merged, _) = engine.merge_all().unwrap();
        assert_eq!(
            merged.rows,
            vec![
                ArtifactRow::new(1, "Python,SQL", "teamwork"),
                ArtifactRow::new(2, "Python", "focus"),
                ArtifactRow::new(3, "Go", ""),
                ArtifactRow::new(4, "Rust", ""),
            ]
        );
        assert_eq!(std::fs::read(engine.store().checkpoint_path()).unwrap(), checkpoint);
        assert_eq!(engine.patch_artifacts(&HashMap::new()).unwrap(), 0);
    }

    #[test]
    fn test_patch_reconciled_fills_only_empty_cells() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);
        engine.merge_with_source().unwrap();

        // Hard was empty for id 2, soft was "focus": only hard may change.
        assert!(engine
            .patch_reconciled(2, "", "focus", "Python", "overwritten?")
            .unwrap());
        let output = engine.load_reconciled().unwrap().unwrap();
        assert_eq!(
            output.skills_of(2),
            Some(("Python".to_string(), "focus".to_string()))
        );
    }

    #[test]
    fn test_patch_reconciled_never_overwrites_even_with_stale_previous() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);
        let (mut output, _) = engine.merge_with_source().unwrap();

        // The caller believes id 1 was empty, but it is populated now.
        assert!(output.patch(1, "", "", "Java", "calm"));
        assert_eq!(
            output.skills_of(1),
            Some(("Python,SQL".to_string(), "teamwork".to_string()))
        );
    }

    #[test]
    fn test_patch_reconciled_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);
        let (mut output, _) = engine.merge_with_source().unwrap();

        output.patch(4, "", "", "Rust", "");
        let after_first = output.clone();
        output.patch(4, "", "", "Rust", "");
        assert_eq!(output, after_first);
        assert_eq!(output.skills_of(4), Some(("Rust".to_string(), String::new())));
    }

    #[test]
    fn test_patch_reconciled_unknown_id_or_no_output() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        seed(&engine);

        assert!(!engine.patch_reconciled(1, "", "", "x", "y").unwrap());
        engine.merge_with_source().unwrap();
        assert!(!engine.patch_reconciled(999, "", "", "x", "y").unwrap());
    }

    #[test]
    fn test_hard_only_response_leaves_soft_untouched() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir, 10);
        engine
            .store()
            .write_batch(1, &[ArtifactRow::new(1, "", "")])
            .unwrap();
        let (mut merged, _) = engine.merge_all().unwrap();

        // Service answered {"hard": ["Python"], "soft": []} for a hard-only request.
        let gap = &engine.find_partial_gaps(None, &HashSet::new()).unwrap()[0];
        assert!(merged.patch_cell(gap.row_index, "Python", &gap.current_soft));
        assert_eq!(merged.rows[0], ArtifactRow::new(1, "Python", ""));
    }
}
