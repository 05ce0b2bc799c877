use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploaderError {
    #[error("Configuration error: {field} - {message}")]
    Configuration { field: String, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("HTTP error {status} from {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to move {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No unused name left for {name} in {}", folder.display())]
    NameExhausted { folder: PathBuf, name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Custom result type
pub type UploaderResult<T> = Result<T, UploaderError>;

impl UploaderError {
    pub fn configuration(field: &str, message: &str) -> Self {
        Self::Configuration {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn authentication(reason: &str) -> Self {
        Self::Authentication(reason.to_string())
    }

    pub fn http(status: u16, url: &str, body: &str) -> Self {
        // Keep the error readable when a server answers with a whole HTML page
        let body: String = body.chars().take(300).collect();
        Self::Http {
            status,
            url: url.to_string(),
            body,
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// HTTP status of the failed request, if the failure came from the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            UploaderError::Http { status, .. } => Some(*status),
            UploaderError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            UploaderError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            UploaderError::Http { status, .. } => should_retry_status(*status),
            _ => false,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            UploaderError::Configuration { .. }
                | UploaderError::Authentication(_)
                | UploaderError::NameExhausted { .. }
        )
    }
}

pub(crate) fn should_retry_status(status_code: u16) -> bool {
    matches!(status_code, 429 | 500 | 502 | 503 | 504)
}
