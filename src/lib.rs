//! Upload every file in a local folder to a Seafile library, then move the
//! uploaded files into a local resting directory so they are not sent twice.

pub mod config;
pub mod errors;
pub mod local_files;
pub mod uploader;

pub use config::{Settings, UploadJobConfig};
pub use errors::{UploaderError, UploaderResult};
pub use uploader::{EventBus, RunPhase, RunSummary, UploadEvent, Uploader};
