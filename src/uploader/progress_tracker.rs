use std::fmt;
use std::sync::{Arc, Mutex};

/// Where a batch run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Discovering,
    PreparingRestingDir,
    Authenticating,
    /// Working on file `index` (0-based) of `total`.
    Uploading { index: usize, total: usize },
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Idle => write!(f, "idle"),
            RunPhase::Discovering => write!(f, "discovering"),
            RunPhase::PreparingRestingDir => write!(f, "preparing resting directory"),
            RunPhase::Authenticating => write!(f, "authenticating"),
            RunPhase::Uploading { index, total } => {
                write!(f, "uploading {}/{}", index + 1, total)
            }
            RunPhase::Completed => write!(f, "completed"),
            RunPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Shared, lock-guarded view of one run's phase.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    run_id: String,
    phase: Arc<Mutex<RunPhase>>,
}

impl PhaseTracker {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            phase: Arc::new(Mutex::new(RunPhase::Idle)),
        }
    }

    pub fn current(&self) -> RunPhase {
        match self.phase.lock() {
            Ok(phase) => *phase,
            Err(e) => {
                log::error!(
                    "Failed to read phase of run {} (non-critical): {}",
                    self.run_id,
                    e
                );
                RunPhase::Failed
            }
        }
    }

    /// Move to `next`. A run that reached a terminal phase stays there.
    pub fn advance(&self, next: RunPhase) -> bool {
        match self.phase.lock() {
            Ok(mut phase) => {
                if phase.is_terminal() {
                    log::warn!(
                        "Run {} is already {}; ignoring transition to {}",
                        self.run_id,
                        *phase,
                        next
                    );
                    return false;
                }
                log::debug!("Run {}: {} -> {}", self.run_id, *phase, next);
                *phase = next;
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to update phase of run {} (non-critical): {}",
                    self.run_id,
                    e
                );
                false
            }
        }
    }
}
