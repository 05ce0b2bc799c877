use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::errors::{UploaderError, UploaderResult};
use crate::uploader::retry::RetryConfig;

pub const DEFAULT_SERVER_URL: &str = "https://drive.vpclab.com";
pub const DEFAULT_RESTING_PATH: &str = "uploaded";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_RETRY_LIMIT: u32 = 10;

/// Flat key/value settings, as read from a settings file or given on the
/// command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON settings file.
    ///
    /// Accepts either a flat object or an object of sections. Sections are
    /// flattened into one namespace; a key repeated in a later section wins.
    pub fn load(path: &Path) -> UploaderResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            UploaderError::configuration(
                "config",
                &format!("Could not read {}: {}", path.display(), e),
            )
        })?;
        let settings = Self::from_json_str(&raw)?;
        log::info!(
            "Loaded {} setting(s) from {}",
            settings.0.len(),
            path.display()
        );
        Ok(settings)
    }

    pub fn from_json_str(raw: &str) -> UploaderResult<Self> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(root) = value else {
            return Err(UploaderError::configuration(
                "config",
                "Settings file must contain a JSON object",
            ));
        };

        let mut settings = Settings::new();
        for (key, value) in root {
            match value {
                Value::Object(section) => {
                    for (k, v) in section {
                        settings.insert_value(k, v);
                    }
                }
                other => settings.insert_value(key, other),
            }
        }
        Ok(settings)
    }

    fn insert_value(&mut self, key: String, value: Value) {
        let text = match value {
            Value::String(s) => s,
            Value::Null => return,
            Value::Array(_) | Value::Object(_) => {
                log::warn!("Ignoring non-scalar setting `{}`", key);
                return;
            }
            other => other.to_string(),
        };
        log::debug!("Setting `{}` read", key);
        self.0.insert(key, text);
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Layer `overrides` on top of these settings. Overrides win on key collision.
    pub fn merge(mut self, overrides: Settings) -> Self {
        self.0.extend(overrides.0);
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Settings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Settings(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

pub fn default_settings_path() -> UploaderResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| UploaderError::configuration("config", "Could not find config directory"))?
        .join("Seafile Uploader");
    Ok(config_dir.join("config.json"))
}

/// Parameters of one upload batch. Immutable once built.
#[derive(Clone)]
pub struct UploadJobConfig {
    pub local_path: PathBuf,
    pub remote_path: String,
    pub repo_id: String,
    pub username: String,
    pub password: String,
    pub resting_path: PathBuf,
    pub server_url: String,
    pub request_timeout: Option<Duration>,
    pub retry: RetryConfig,
}

impl fmt::Debug for UploadJobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadJobConfig")
            .field("local_path", &self.local_path)
            .field("remote_path", &self.remote_path)
            .field("repo_id", &self.repo_id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("resting_path", &self.resting_path)
            .field("server_url", &self.server_url)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl UploadJobConfig {
    pub fn from_settings(settings: &Settings) -> UploaderResult<Self> {
        let local_path = PathBuf::from(required(settings, "local_path")?);
        let remote_path = normalize_remote_path(required(settings, "remote_path")?);
        let repo_id = required(settings, "repo_id")?.trim().to_string();
        let username = required(settings, "username")?.to_string();
        let password = required(settings, "password")?.to_string();

        let resting_path = PathBuf::from(
            settings
                .get("resting_path")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_RESTING_PATH),
        );

        let server_url = settings
            .get("server_url")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SERVER_URL)
            .trim_end_matches('/')
            .to_string();

        let timeout_secs =
            parse_number::<u64>(settings, "timeout_secs")?.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let request_timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));

        let mut retry = RetryConfig::default();
        if let Some(max_retries) = parse_number::<u32>(settings, "max_retries")? {
            retry.max_retries = max_retries;
        }
        if let Some(delay_ms) = parse_number::<u64>(settings, "retry_delay_ms")? {
            retry.base_delay = Duration::from_millis(delay_ms);
        }

        let config = Self {
            local_path,
            remote_path,
            repo_id,
            username,
            password,
            resting_path,
            server_url,
            request_timeout,
            retry,
        };
        validate_config(&config)?;
        Ok(config)
    }

    /// Absolute location of the resting directory.
    pub fn local_resting_path(&self) -> PathBuf {
        self.local_path.join(&self.resting_path)
    }

    /// Remote folder as sent on the wire: always starts with `/`.
    pub fn upload_dir(&self) -> String {
        format!("/{}", self.remote_path)
    }
}

fn required<'a>(settings: &'a Settings, field: &str) -> UploaderResult<&'a str> {
    match settings.get(field) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(UploaderError::configuration(field, "Must not be empty")),
        None => Err(UploaderError::configuration(field, "Missing required setting")),
    }
}

fn parse_number<T: std::str::FromStr>(
    settings: &Settings,
    field: &str,
) -> UploaderResult<Option<T>> {
    match settings.get(field).map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| UploaderError::configuration(field, "Must be a non-negative integer")),
    }
}

pub fn normalize_remote_path(raw: &str) -> String {
    raw.trim().trim_matches('/').to_string()
}

pub fn validate_config(config: &UploadJobConfig) -> UploaderResult<()> {
    if config.resting_path.is_absolute()
        || config
            .resting_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
    {
        return Err(UploaderError::configuration(
            "resting_path",
            "Must be a relative path inside local_path",
        ));
    }

    if !(config.server_url.starts_with("http://") || config.server_url.starts_with("https://")) {
        return Err(UploaderError::configuration(
            "server_url",
            "Must start with http:// or https://",
        ));
    }

    if config.retry.max_retries > MAX_RETRY_LIMIT {
        return Err(UploaderError::configuration(
            "max_retries",
            "Must be 10 or fewer",
        ));
    }

    Ok(())
}
