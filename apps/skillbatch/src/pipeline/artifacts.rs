//! Batch artifact store: one `<offset>.csv` per batch, plus the merged and
//! reconciled outputs living in the same directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::pipeline::checkpoint::{self, Checkpoint};
use crate::pipeline::PipelineError;

pub const ARTIFACT_EXTENSION: &str = "csv";
pub const MERGED_FILE: &str = "merged_results.csv";
pub const RECONCILED_FILE: &str = "merged_with_original.xlsx";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
pub const UNRESOLVED_FILE: &str = "gap_fill_unresolved.json";

/// One processed vacancy as stored in an artifact. Skill columns hold the
/// comma-joined lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRow {
    pub id: u64,
    #[serde(default)]
    pub hard_skills: String,
    #[serde(default)]
    pub soft_skills: String,
}

impl ArtifactRow {
    pub fn new(id: u64, hard_skills: impl Into<String>, soft_skills: impl Into<String>) -> Self {
        Self {
            id,
            hard_skills: hard_skills.into(),
            soft_skills: soft_skills.into(),
        }
    }
}

pub fn artifact_name(offset: usize) -> String {
    format!("{offset}.{ARTIFACT_EXTENSION}")
}

/// Parses `"<offset>.csv"`; anything else (merged outputs, temp files) is `None`.
pub fn parse_artifact_name(name: &str) -> Option<usize> {
    name.strip_suffix(ARTIFACT_EXTENSION)?
        .strip_suffix('.')?
        .parse::<usize>()
        .ok()
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> Result<(), PipelineError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn artifact_path(&self, offset: usize) -> PathBuf {
        self.dir.join(artifact_name(offset))
    }

    pub fn merged_path(&self) -> PathBuf {
        self.dir.join(MERGED_FILE)
    }

    pub fn reconciled_path(&self) -> PathBuf {
        self.dir.join(RECONCILED_FILE)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn unresolved_path(&self) -> PathBuf {
        self.dir.join(UNRESOLVED_FILE)
    }

    /// Offsets of every artifact on disk, ascending. A missing directory has none.
    pub fn list_offsets(&self) -> Result<Vec<usize>, PipelineError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut offsets = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(offset) = entry.file_name().to_str().and_then(parse_artifact_name) {
                offsets.push(offset);
            }
        }
        offsets.sort_unstable();
        Ok(offsets)
    }

    /// Largest artifact offset on disk, 0 when there is none.
    pub fn scan_resume_offset(&self) -> Result<usize, PipelineError> {
        Ok(self.list_offsets()?.last().copied().unwrap_or(0))
    }

    /// Where the next run starts: the checkpoint when it points at an existing
    /// artifact, otherwise a directory scan. The checkpoint only ever moves
    /// forward, so it names the largest offset written.
    pub fn resume_offset(&self) -> Result<usize, PipelineError> {
        if let Some(cp) = checkpoint::load(&self.checkpoint_path()) {
            if self.dir.join(&cp.artifact).is_file() {
                debug!(offset = cp.last_offset, "Resuming from checkpoint");
                return Ok(cp.last_offset);
            }
            debug!(artifact = %cp.artifact, "Checkpoint artifact missing, scanning");
        }
        self.scan_resume_offset()
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        checkpoint::load(&self.checkpoint_path())
    }

    /// Persists one batch as `<offset>.csv`. The checkpoint advances only when
    /// `offset` is past it; rewriting an earlier batch leaves it alone.
    pub fn write_batch(&self, offset: usize, rows: &[ArtifactRow]) -> Result<PathBuf, PipelineError> {
        self.ensure_dir()?;
        let path = self.artifact_path(offset);
        write_rows_atomic(&path, rows)?;
        let advance = match self.checkpoint() {
            Some(cp) => offset > cp.last_offset,
            None => true,
        };
        if advance {
            checkpoint::save(
                &self.checkpoint_path(),
                &Checkpoint::new(offset, artifact_name(offset)),
            )?;
        } else {
            debug!(offset, "Rewrote an earlier batch, checkpoint unchanged");
        }
        info!(offset, rows = rows.len(), path = %path.display(), "Batch artifact written");
        Ok(path)
    }

    #[cfg(test)]
    pub fn read_artifact(&self, offset: usize) -> Result<Vec<ArtifactRow>, PipelineError> {
        let path = self.artifact_path(offset);
        if !path.is_file() {
            return Err(PipelineError::NotFound(artifact_name(offset)));
        }
        read_rows(&path)
    }

    /// Smallest artifact offset that is `>= requested`, i.e. the batch whose
    /// range covers the requested row.
    pub fn artifact_covering(&self, requested: usize) -> Result<Option<usize>, PipelineError> {
        Ok(self
            .list_offsets()?
            .into_iter()
            .find(|&offset| offset >= requested))
    }

    /// Number of data rows across all artifacts.
    pub fn processed_rows(&self) -> Result<usize, PipelineError> {
        let mut total = 0;
        for offset in self.list_offsets()? {
            total += read_rows(&self.artifact_path(offset))?.len();
        }
        Ok(total)
    }
}

pub fn read_rows(path: &Path) -> Result<Vec<ArtifactRow>, PipelineError> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Writes rows with a header, going through a temp file so a crash never leaves
/// a truncated artifact under its final name.
pub fn write_rows_atomic(path: &Path, rows: &[ArtifactRow]) -> Result<(), PipelineError> {
    let tmp = path.with_extension(format!("{ARTIFACT_EXTENSION}.tmp"));
    {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(&tmp)?;
        writer.write_record(["id", "hard_skills", "soft_skills"])?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
