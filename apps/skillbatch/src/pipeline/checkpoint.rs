//! Last-completed-offset record kept next to the batch artifacts.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::pipeline::PipelineError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_offset: usize,
    pub artifact: String,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(last_offset: usize, artifact: impl Into<String>) -> Self {
        Self {
            last_offset,
            artifact: artifact.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Reads the checkpoint. A missing file is `None`; a corrupt one is logged and
/// treated as missing so resume can fall back to scanning.
pub fn load(path: &Path) -> Option<Checkpoint> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), "Cannot read checkpoint: {e}");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(cp) => Some(cp),
        Err(e) => {
            warn!(path = %path.display(), "Ignoring corrupt checkpoint: {e}");
            None
        }
    }
}

/// Writes the checkpoint through a temporary file and a rename.
pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<(), PipelineError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
