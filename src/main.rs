use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;

use seafile_uploader::config::{default_settings_path, Settings};
use seafile_uploader::Uploader;

#[derive(Debug, Parser)]
#[command(version, about = "Upload a local folder to a Seafile library")]
struct Cli {
    /// JSON settings file; defaults to the per-user config file if present
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    local_path: Option<String>,

    #[arg(long)]
    remote_path: Option<String>,

    #[arg(long)]
    repo_id: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long, env = "SEAFILE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Where uploaded files are parked, relative to the local path
    #[arg(long)]
    resting_path: Option<String>,

    #[arg(long)]
    server_url: Option<String>,

    /// Connect and API-call timeout; 0 disables it. Uploads are not capped
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retries for transient network and server errors
    #[arg(long)]
    max_retries: Option<u32>,

    /// Delay before the first retry; later retries back off exponentially
    #[arg(long)]
    retry_delay_ms: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> Settings {
        let mut settings = Settings::new();
        let pairs = [
            ("local_path", self.local_path.clone()),
            ("remote_path", self.remote_path.clone()),
            ("repo_id", self.repo_id.clone()),
            ("username", self.username.clone()),
            ("password", self.password.clone()),
            ("resting_path", self.resting_path.clone()),
            ("server_url", self.server_url.clone()),
            ("timeout_secs", self.timeout_secs.map(|v| v.to_string())),
            ("max_retries", self.max_retries.map(|v| v.to_string())),
            ("retry_delay_ms", self.retry_delay_ms.map(|v| v.to_string())),
        ];
        for (key, value) in pairs {
            if let Some(value) = value {
                settings.set(key, value);
            }
        }
        settings
    }

    fn settings_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }
        default_settings_path().ok().filter(|path| path.exists())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let settings_path = cli.settings_path();

    let mut uploader = Uploader::from_settings(settings_path.as_deref(), cli.overrides())
        .context("Invalid uploader configuration")?;

    let events = uploader.events();
    events.on_progress(|fraction| println!("Progress: {:.2}", fraction * 100.0));
    events.on_status(|status| println!("Status: {}", status));
    events.on_complete(|| println!("Complete!"));
    events.on_error(|error| eprintln!("Error: {}", error));

    uploader.start().await.context("Could not start upload")?;

    match uploader.wait().await {
        Some(Err(error)) => Err(anyhow::anyhow!("Upload failed: {}", error)),
        _ => Ok(()),
    }
}
