use std::sync::Arc;

use crate::config::Config;
use crate::extraction::SkillClient;
use crate::pipeline::artifacts::ArtifactStore;
use crate::pipeline::merge::MergeEngine;
use crate::pipeline::supervisor::Supervisor;
use crate::source::SourceReader;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Concrete client, kept for the upstream health probe.
    pub client: SkillClient,
    pub reader: SourceReader,
    pub store: ArtifactStore,
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub fn merge_engine(&self) -> MergeEngine {
        MergeEngine::new(self.store.clone(), self.reader.clone())
    }
}
