use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{Settings, UploadJobConfig};
use crate::errors::{UploaderError, UploaderResult};

use super::events::EventBus;
use super::progress_tracker::{PhaseTracker, RunPhase};
use super::upload_worker::{RunResult, UploadWorker};

struct ActiveRun {
    run_id: String,
    task: JoinHandle<RunResult>,
}

/// Owns the job configuration and at most one running [`UploadWorker`].
///
/// Every run's notifications are re-published on [`Uploader::events`], so
/// subscribers register once and see all runs.
pub struct Uploader {
    config: Arc<UploadJobConfig>,
    events: EventBus,
    active: Option<ActiveRun>,
    last_phase: Option<PhaseTracker>,
}

impl Uploader {
    pub fn new(config: UploadJobConfig) -> Self {
        Self {
            config: Arc::new(config),
            events: EventBus::new(),
            active: None,
            last_phase: None,
        }
    }

    /// Build from an optional settings file plus direct overrides. Overrides
    /// win over same-named keys from the file.
    pub fn from_settings(
        settings_path: Option<&Path>,
        overrides: Settings,
    ) -> UploaderResult<Self> {
        let file_settings = match settings_path {
            Some(path) => Settings::load(path)?,
            None => Settings::new(),
        };
        let config = UploadJobConfig::from_settings(&file_settings.merge(overrides))?;
        log::debug!("Uploader configured: {:?}", config);
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &UploadJobConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Phase of the most recent run, `Idle` before the first one.
    pub fn phase(&self) -> RunPhase {
        self.last_phase
            .as_ref()
            .map(PhaseTracker::current)
            .unwrap_or(RunPhase::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .map(|run| !run.task.is_finished())
            .unwrap_or(false)
    }

    /// Launch a new run and return its id without waiting for it.
    ///
    /// If the previous run is still going, this waits for it to finish first.
    pub async fn start(&mut self) -> UploaderResult<String> {
        if self.active.is_some() {
            log::info!("Waiting for the previous upload run to finish");
            self.wait().await;
        }

        let worker = UploadWorker::new(self.config.clone()).map_err(|e| {
            log::error!("Could not prepare upload run: {}", e);
            e
        })?;

        worker.events().forward_to(&self.events);
        let run_id = worker.run_id().to_string();
        self.last_phase = Some(worker.phase_handle());

        let task = tokio::spawn(worker.run());
        self.active = Some(ActiveRun {
            run_id: run_id.clone(),
            task,
        });

        log::info!("Upload run {} started", run_id);
        Ok(run_id)
    }

    /// Wait for the current run, if any, and return its outcome.
    pub async fn wait(&mut self) -> Option<RunResult> {
        let run = self.active.take()?;

        match run.task.await {
            Ok(result) => Some(result),
            Err(e) => {
                let error = Arc::new(UploaderError::Internal(format!(
                    "Upload run {} aborted: {}",
                    run.run_id, e
                )));
                log::error!("{}", error);
                if let Some(phase) = &self.last_phase {
                    phase.advance(RunPhase::Failed);
                }
                self.events.error(error.clone());
                Some(Err(error))
            }
        }
    }
}
