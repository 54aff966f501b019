//! Control surface: the operator commands (progress, start/stop, merge,
//! gap fill, statistics, artifact download) and their HTTP handlers.

pub mod commands;
pub mod handlers;

use serde::Serialize;
use serde_json::Value;

/// Reply to every command: a human-readable status line plus optional
/// structured details.
#[derive(Debug, Clone, Serialize)]
pub struct CommandReply {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReply {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    /// Attaches a serialized payload. Serialization failures drop the payload.
    pub fn with_data<T: Serialize>(mut self, data: &T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::config::Config;
    use crate::extraction::SkillClient;
    use crate::pipeline::artifacts::ArtifactStore;
    use crate::pipeline::supervisor::Supervisor;
    use crate::pipeline::test_support::FixedExtractor;
    use crate::source::test_support::write_source;
    use crate::source::SourceReader;
    use crate::state::AppState;

    /// State over a fresh CSV source of `rows` vacancies, with a fake extractor
    /// behind the supervisor and no delays.
    pub fn test_state(dir: &TempDir, rows: usize) -> AppState {
        let config = Config {
            source_path: write_source(dir.path(), rows),
            artifacts_dir: dir.path().join("process_vacs"),
            extraction_url: "http://127.0.0.1:9/extract".into(),
            extraction_timeout: Duration::from_secs(1),
            batch_size: 10,
            request_delay: Duration::ZERO,
            gap_fill_max_attempts: 2,
            gap_fill_backoff: Duration::ZERO,
            auto_start: false,
            port: 0,
            rust_log: "info".into(),
        };
        let reader = SourceReader::new(config.source_path.clone());
        let store = ArtifactStore::new(config.artifacts_dir.clone());
        let supervisor = Supervisor::new(
            reader.clone(),
            store.clone(),
            Arc::new(FixedExtractor::new(&["Python"], &["teamwork"])),
            config.runner_settings(),
            config.gap_fill_settings(),
        );

        AppState {
            client: SkillClient::new(&config.extraction_url, config.extraction_timeout).unwrap(),
            config,
            reader,
            store,
            supervisor: Arc::new(supervisor),
        }
    }
}
