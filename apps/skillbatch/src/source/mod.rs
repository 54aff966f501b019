//! Row Source Reader: offset-bounded windows of vacancies from the tabular source.

pub mod clean;
pub mod table;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::models::vacancy::VacancyRecord;
use crate::source::clean::strip_markup;
use crate::source::table::{count_rows, read_table, read_table_window, Table, TableError};

pub const ID_COLUMN: &str = "id";
pub const TEXT_COLUMN: &str = "description";

/// Result of reading one window of raw rows.
///
/// `rows_read` counts every data row consumed from the source, including the
/// ones dropped for a missing id or empty text; callers advance their offset by
/// it so dropped rows are never read twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceWindow {
    pub records: Vec<VacancyRecord>,
    pub rows_read: usize,
}

/// Read-only handle on the vacancy source file.
#[derive(Debug, Clone)]
pub struct SourceReader {
    path: PathBuf,
}

impl SourceReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to `batch_size` rows starting `start_offset` data rows after the
    /// header and returns the usable ones. An unreadable source yields an empty
    /// list; the failure is logged.
    pub fn read_batch(&self, batch_size: usize, start_offset: usize) -> Vec<VacancyRecord> {
        self.read_window(batch_size, start_offset).records
    }

    /// Same as `read_batch`, also reporting how many raw rows were consumed.
    pub fn read_window(&self, batch_size: usize, start_offset: usize) -> SourceWindow {
        match self.try_read_window(batch_size, start_offset) {
            Ok(window) => window,
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    start_offset,
                    "Failed to read vacancy source: {e}"
                );
                SourceWindow::default()
            }
        }
    }

    pub fn try_read_window(
        &self,
        batch_size: usize,
        start_offset: usize,
    ) -> Result<SourceWindow, TableError> {
        if batch_size == 0 {
            return Ok(SourceWindow::default());
        }

        let table = read_table_window(&self.path, start_offset, batch_size)?;
        let id_col = table.require_column(ID_COLUMN)?;
        let text_col = table.require_column(TEXT_COLUMN)?;

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(table.len());

        for row_idx in 0..table.len() {
            let Some(id) = table.cell(row_idx, id_col).as_id() else {
                debug!(row = start_offset + row_idx, "Skipping row without a valid id");
                continue;
            };

            let raw_text = table.cell(row_idx, text_col).to_string();
            let cleaned_text = strip_markup(&raw_text);
            if cleaned_text.is_empty() {
                debug!(vacancy_id = id, "Skipping vacancy with empty description");
                continue;
            }

            if !seen.insert(id) {
                warn!(vacancy_id = id, "Duplicate vacancy id within one window, keeping first");
                continue;
            }

            records.push(VacancyRecord {
                id,
                raw_text,
                cleaned_text,
            });
        }

        Ok(SourceWindow {
            records,
            rows_read: table.len(),
        })
    }

    /// Total number of data rows, or 0 when the source cannot be read.
    pub fn total_rows(&self) -> usize {
        match count_rows(&self.path) {
            Ok(n) => n,
            Err(e) => {
                error!(path = %self.path.display(), "Failed to count source rows: {e}");
                0
            }
        }
    }

    /// Loads the full source table (all columns).
    pub fn load_table(&self) -> Result<Table, TableError> {
        read_table(&self.path)
    }

    /// Cleaned descriptions for the requested ids. Ids absent from the source,
    /// or whose description cleans to nothing, are not in the map.
    pub fn texts_for_ids(&self, ids: &HashSet<u64>) -> Result<HashMap<u64, String>, TableError> {
        let table = self.load_table()?;
        let id_col = table.require_column(ID_COLUMN)?;
        let text_col = table.require_column(TEXT_COLUMN)?;

        let mut texts = HashMap::with_capacity(ids.len());
        for row_idx in 0..table.len() {
            let Some(id) = table.cell(row_idx, id_col).as_id() else {
                continue;
            };
            if !ids.contains(&id) || texts.contains_key(&id) {
                continue;
            }
            let cleaned = strip_markup(&table.cell(row_idx, text_col).to_string());
            if !cleaned.is_empty() {
                texts.insert(id, cleaned);
            }
        }

        Ok(texts)
    }
}
