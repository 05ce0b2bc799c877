use std::path::PathBuf;
use std::sync::Arc;

use crate::config::UploadJobConfig;
use crate::errors::{UploaderError, UploaderResult};
use crate::local_files::{discover_local_files, ensure_resting_dir, move_to_resting};

use super::events::EventBus;
use super::progress_tracker::{PhaseTracker, RunPhase};
use super::seafile_client::{AuthToken, LinkResponse, SeafileClient, UploadLink};

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    /// Final resting location of every uploaded file, in upload order.
    pub uploaded: Vec<PathBuf>,
}

pub type RunResult = Result<RunSummary, Arc<UploaderError>>;

/// One batch run: discover, authenticate, upload and park every file in the
/// source directory, stopping at the first failure.
pub struct UploadWorker {
    run_id: String,
    config: Arc<UploadJobConfig>,
    client: SeafileClient,
    events: EventBus,
    phase: PhaseTracker,
}

impl UploadWorker {
    pub fn new(config: Arc<UploadJobConfig>) -> UploaderResult<Self> {
        let client = SeafileClient::from_config(&config)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Arc<UploadJobConfig>, client: SeafileClient) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        Self {
            phase: PhaseTracker::new(&run_id),
            run_id,
            config,
            client,
            events: EventBus::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn phase_handle(&self) -> PhaseTracker {
        self.phase.clone()
    }

    /// Execute the run to completion or first failure. Emits `Complete` or a
    /// single `Error`, never both.
    pub async fn run(self) -> RunResult {
        log::info!(
            "Starting upload run {} from {}",
            self.run_id,
            self.config.local_path.display()
        );

        match self.upload_all().await {
            Ok(uploaded) => {
                self.phase.advance(RunPhase::Completed);
                log::info!(
                    "Upload run {} completed: {} file(s) uploaded",
                    self.run_id,
                    uploaded.len()
                );
                self.events.complete();
                Ok(RunSummary {
                    run_id: self.run_id.clone(),
                    uploaded,
                })
            }
            Err(e) => {
                self.phase.advance(RunPhase::Failed);
                match e.status() {
                    Some(status) => log::error!(
                        "Upload run {} failed (HTTP {}): {}",
                        self.run_id,
                        status,
                        e
                    ),
                    None => log::error!("Upload run {} failed: {}", self.run_id, e),
                }
                if e.is_permanent() {
                    log::error!("Fix the settings or credentials before starting another run");
                }
                let error = Arc::new(e);
                self.events.error(error.clone());
                Err(error)
            }
        }
    }

    async fn upload_all(&self) -> UploaderResult<Vec<PathBuf>> {
        let config = &self.config;

        self.phase.advance(RunPhase::Discovering);
        self.events.status("Discovering local files...");
        let files = discover_local_files(&config.local_path)?;

        self.phase.advance(RunPhase::PreparingRestingDir);
        self.events.status(format!(
            "Creating local resting path `{}`...",
            config.local_resting_path().display()
        ));
        let resting_dir = ensure_resting_dir(&config.local_path, &config.resting_path)?;

        self.phase.advance(RunPhase::Authenticating);
        self.events.status("Getting authorization token...");
        let token = self
            .client
            .auth_token(&config.username, &config.password)
            .await?;

        let total = files.len();
        let remote_dir = config.upload_dir();
        let mut uploaded = Vec::with_capacity(total);

        for (index, file) in files.iter().enumerate() {
            self.phase.advance(RunPhase::Uploading { index, total });

            let link = self.get_or_create_upload_link(&token, &remote_dir).await?;

            self.events.status(format!("Uploading {}...", file.display()));
            self.client
                .upload_file(&token, &link, &remote_dir, file)
                .await?;

            let destination = move_to_resting(file, &resting_dir)?;
            log::info!(
                "Uploaded {} ({}/{}), parked at {}",
                file.display(),
                index + 1,
                total,
                destination.display()
            );
            uploaded.push(destination);

            self.events.progress((index + 1) as f64 / total as f64);
        }

        Ok(uploaded)
    }

    /// Fetch an upload link, creating the remote directory and asking once
    /// more if the server reports it missing.
    async fn get_or_create_upload_link(
        &self,
        token: &AuthToken,
        remote_dir: &str,
    ) -> UploaderResult<UploadLink> {
        let repo_id = &self.config.repo_id;

        self.events.status("Getting upload link...");
        let first = self.client.upload_link(token, repo_id, remote_dir).await?;
        if let LinkResponse::Found(link) = first {
            return Ok(link);
        }

        self.events
            .status(format!("Creating remote directory `{}`...", remote_dir));
        self.client.make_dir(token, repo_id, remote_dir).await?;

        self.events.status("Getting upload link...");
        match self.client.upload_link(token, repo_id, remote_dir).await? {
            LinkResponse::Found(link) => Ok(link),
            LinkResponse::DirectoryMissing => Err(UploaderError::http(
                404,
                &format!("repos/{}/upload-link/?p={}", repo_id, remote_dir),
                "Remote directory still missing after mkdir",
            )),
        }
    }
}
