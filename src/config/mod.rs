//! Configuration module
//!
//! Provides centralized configuration:
//! - Portable paths under `$HOME/.bobo/` (log file, client config)
//! - Build information (version)
//! - [`ClientConfig`]: backend endpoint, storage bucket, polling cadence,
//!   loaded from the config file with environment-variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Default poll interval. The source variants ranged 3.5-5 s; 3.5 s is the
/// one this client uses consistently.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_500;

/// Dismissed-alert history is capped at this many rows per fetch.
pub const DEFAULT_PAST_ALERT_LIMIT: usize = 50;

/// Product bucket holding per-event media objects.
pub const DEFAULT_BUCKET: &str = "falls";

/// Configuration manager for paths and build info.
pub struct Config;

impl Config {
    /// Get the log file path
    ///
    /// Returns a path in the user's home directory: `$HOME/.bobo/debug.log`
    /// Falls back to a temporary directory if HOME is not available.
    pub fn log_file_path() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".bobo").join("debug.log");
        }
        std::env::temp_dir().join("bobo-debug.log")
    }

    /// Get the client config file path
    ///
    /// Returns a path in the user's home directory: `$HOME/.bobo/config.json`
    /// Falls back to a temporary directory if HOME is not available.
    pub fn config_file_path() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".bobo").join("config.json");
        }
        std::env::temp_dir().join("bobo-config.json")
    }

    /// Get the chime WAV path
    ///
    /// Returns a path in the user's home directory: `$HOME/.bobo/chime.wav`
    /// Falls back to a temporary directory if HOME is not available.
    pub fn chime_file_path() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".bobo").join("chime.wav");
        }
        std::env::temp_dir().join("bobo-chime.wav")
    }

    /// Ensure the log directory exists
    pub fn ensure_log_directory() -> std::io::Result<()> {
        if let Some(parent) = Self::log_file_path().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Get the version string from CARGO_PKG_VERSION.
    pub fn version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }
}

/// Client configuration: where the backend and storage live and how the
/// poller behaves. Read from `config.json`, then overridden by environment
/// variables (`BOBO_BACKEND_URL`, `BOBO_API_KEY`, `BOBO_USER_ID`,
/// `BOBO_BUCKET`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the managed backend, e.g. "https://xyz.backend.example".
    #[serde(default)]
    pub backend_url: String,
    /// Public api key sent as `apikey` and bearer token.
    #[serde(default)]
    pub api_key: String,
    /// Signed-in user identity. The poller only needs its id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Object-storage bucket holding `<event-id>.<ext>` media.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_past_alert_limit")]
    pub past_alert_limit: usize,
    /// Arrival chime opt-in. Off until the user enables it.
    #[serde(default)]
    pub sound_enabled: bool,
    /// External command used to play the chime WAV (e.g. "aplay", "afplay").
    /// When unset, the terminal bell is used instead.
    #[serde(default)]
    pub sound_player: Option<String>,
    /// Try a time-limited signed URL when the public media URL probe fails.
    #[serde(default = "default_true")]
    pub signed_url_fallback: bool,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_past_alert_limit() -> usize {
    DEFAULT_PAST_ALERT_LIMIT
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            api_key: String::new(),
            user_id: None,
            bucket: default_bucket(),
            poll_interval_ms: default_poll_interval_ms(),
            past_alert_limit: default_past_alert_limit(),
            sound_enabled: false,
            sound_player: None,
            signed_url_fallback: true,
        }
    }
}

impl ClientConfig {
    /// Load from the given path (or the default config path), then apply
    /// environment overrides. A missing file is fine; env vars alone can
    /// fully configure the client.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Config::config_file_path);

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))?
        } else {
            ClientConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BOBO_BACKEND_URL") {
            self.backend_url = v;
        }
        if let Ok(v) = std::env::var("BOBO_API_KEY") {
            self.api_key = v;
        }
        if let Ok(v) = std::env::var("BOBO_USER_ID") {
            self.user_id = Some(v);
        }
        if let Ok(v) = std::env::var("BOBO_BUCKET") {
            self.bucket = v;
        }
    }

    /// Validate endpoint and key presence before building clients.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.backend_url).context("Invalid backend URL")?;
        if self.api_key.is_empty() {
            anyhow::bail!("Missing api key (config file or BOBO_API_KEY)");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        Ok(())
    }
}
