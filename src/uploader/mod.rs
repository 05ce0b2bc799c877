// Uploader module - runs batch uploads to a Seafile library
//
// The coordinator owns the configuration and one worker at a time; the worker
// talks to the server through the client and reports through the event bus.

pub mod coordinator;
pub mod events;
pub mod progress_tracker;
pub mod retry;
pub mod seafile_client;
pub mod upload_worker;

pub use coordinator::Uploader;
pub use events::{EventBus, UploadEvent};
pub use progress_tracker::RunPhase;
pub use upload_worker::{RunResult, RunSummary, UploadWorker};
