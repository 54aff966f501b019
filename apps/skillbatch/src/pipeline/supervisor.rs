//! Owns the two background workers (batch runner and gap filler).
//!
//! Each worker lives in a [`WorkerSlot`]: at most one task per slot, stopped
//! cooperatively through its `CancellationToken`. A worker that returns an
//! error or panics is logged and its slot reads as idle again.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::extraction::SkillExtractor;
use crate::pipeline::artifacts::ArtifactStore;
use crate::pipeline::gap_fill::{GapFillReport, GapFillSettings, GapFiller};
use crate::pipeline::merge::MergeEngine;
use crate::pipeline::runner::{BatchRunner, RunSummary, RunnerSettings};
use crate::source::SourceReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Running,
    /// Cancellation requested, task still finishing its current unit of work.
    Stopping,
}

impl WorkerState {
    pub fn is_active(&self) -> bool {
        !matches!(self, WorkerState::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopping,
    NotRunning,
}

struct ActiveWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct WorkerSlot {
    name: &'static str,
    active: Mutex<Option<ActiveWorker>>,
}

impl WorkerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> WorkerState {
        match lock(&self.active).as_ref() {
            Some(worker) if !worker.handle.is_finished() => {
                if worker.cancel.is_cancelled() {
                    WorkerState::Stopping
                } else {
                    WorkerState::Running
                }
            }
            _ => WorkerState::Idle,
        }
    }

    /// Spawns `job` unless a previous one is still alive in this slot.
    pub fn start<F, Fut>(&self, job: F) -> StartOutcome
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut active = lock(&self.active);
        if active.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return StartOutcome::AlreadyRunning;
        }

        let cancel = CancellationToken::new();
        let work = tokio::spawn(job(cancel.clone()));
        let name = self.name;
        let handle = tokio::spawn(async move {
            if let Err(e) = work.await {
                error!(worker = name, "Worker task aborted: {e}");
            }
        });

        info!(worker = name, "Worker started");
        *active = Some(ActiveWorker { cancel, handle });
        StartOutcome::Started
    }

    /// Requests cancellation; the worker stops at its next checkpoint.
    pub fn stop(&self) -> StopOutcome {
        match lock(&self.active).as_ref() {
            Some(worker) if !worker.handle.is_finished() => {
                worker.cancel.cancel();
                info!(worker = self.name, "Worker stop requested");
                StopOutcome::Stopping
            }
            _ => StopOutcome::NotRunning,
        }
    }

    /// Waits for the current task, if any, to finish.
    pub async fn join(&self) {
        let handle = lock(&self.active).take().map(|w| w.handle);
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

pub struct Supervisor {
    reader: SourceReader,
    store: ArtifactStore,
    extractor: Arc<dyn SkillExtractor>,
    runner_settings: RunnerSettings,
    gap_fill_settings: GapFillSettings,
    runner: WorkerSlot,
    gap_filler: WorkerSlot,
    last_run: Arc<Mutex<Option<RunSummary>>>,
    last_gap_fill: Arc<Mutex<Option<GapFillReport>>>,
}

impl Supervisor {
    pub fn new(
        reader: SourceReader,
        store: ArtifactStore,
        extractor: Arc<dyn SkillExtractor>,
        runner_settings: RunnerSettings,
        gap_fill_settings: GapFillSettings,
    ) -> Self {
        Self {
            reader,
            store,
            extractor,
            runner_settings,
            gap_fill_settings,
            runner: WorkerSlot::new("batch_runner"),
            gap_filler: WorkerSlot::new("gap_filler"),
            last_run: Arc::new(Mutex::new(None)),
            last_gap_fill: Arc::new(Mutex::new(None)),
        }
    }

    pub fn runner_state(&self) -> WorkerState {
        self.runner.state()
    }

    pub fn gap_fill_state(&self) -> WorkerState {
        self.gap_filler.state()
    }

    pub fn last_run(&self) -> Option<RunSummary> {
        lock(&self.last_run).clone()
    }

    pub fn last_gap_fill(&self) -> Option<GapFillReport> {
        lock(&self.last_gap_fill).clone()
    }

    /// Starts the batch runner from the resume offset.
    pub fn start_processing(&self) -> StartOutcome {
        let runner = BatchRunner::new(
            self.reader.clone(),
            self.store.clone(),
            self.extractor.clone(),
            self.runner_settings.clone(),
        );
        let last_run = self.last_run.clone();

        self.runner.start(move |cancel| async move {
            match runner.run(cancel).await {
                Ok(summary) => *lock(&last_run) = Some(summary),
                Err(e) => error!("Batch run failed: {e}"),
            }
        })
    }

    pub fn stop_processing(&self) -> StopOutcome {
        self.runner.stop()
    }

    /// Starts a gap-fill pass over at most `limit` rows (all when `None`).
    /// Rows earlier runs left unresolved join only with `retry_unresolved`.
    pub fn start_gap_fill(&self, limit: Option<usize>, retry_unresolved: bool) -> StartOutcome {
        let engine = MergeEngine::new(self.store.clone(), self.reader.clone());
        let settings = GapFillSettings {
            limit,
            retry_unresolved,
            ..self.gap_fill_settings.clone()
        };
        let filler = GapFiller::new(engine, self.extractor.clone(), settings);
        let last_gap_fill = self.last_gap_fill.clone();

        self.gap_filler.start(move |cancel| async move {
            match filler.run(cancel).await {
                Ok(report) => *lock(&last_gap_fill) = Some(report),
                Err(e) => error!("Gap fill failed: {e}"),
            }
        })
    }

    pub fn stop_gap_fill(&self) -> StopOutcome {
        self.gap_filler.stop()
    }

    /// Cancels both workers and waits for them.
    pub async fn shutdown(&self) {
        self.runner.stop();
        self.gap_filler.stop();
        self.runner.join().await;
        self.gap_filler.join().await;
    }

    #[cfg(test)]
    pub async fn join_all(&self) {
        self.runner.join().await;
        self.gap_filler.join().await;
    }
}
