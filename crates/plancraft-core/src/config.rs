use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8002/api/v1";

const API_BASE_URL_ENV: &str = "PLANCRAFT_API_BASE_URL";
const API_TOKEN_ENV: &str = "PLANCRAFT_API_TOKEN";

/// Runtime configuration for a pipeline session
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the design backend
    pub api_base_url: String,
    /// Bearer token attached to outbound calls, if any
    pub api_token: Option<String>,
    /// Timeout for a single remote request
    pub request_timeout: Duration,
    /// Interval between task status checks
    pub poll_interval: Duration,
    /// How long a transient notice stays visible
    pub notice_ttl: Duration,
    /// Consecutive failed status checks before a task is declared failed.
    /// `None` keeps polling indefinitely.
    pub max_consecutive_poll_failures: Option<u32>,
    /// Send refinement instructions to the backend instead of acknowledging them
    pub refinement_enabled: bool,
    /// Persisted settings file (~/.config/plancraft/settings.json)
    pub settings_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            notice_ttl: Duration::from_millis(2500),
            max_consecutive_poll_failures: None,
            refinement_enabled: false,
            settings_file: default_settings_file(),
        }
    }
}

impl Config {
    /// Load configuration from the settings file and environment, or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from(&default_settings_file())
    }

    /// Load configuration using the given settings file.
    ///
    /// Environment variables win over the settings file.
    pub fn load_from(settings_file: &Path) -> Self {
        let settings = Settings::load(settings_file);
        let mut config = Self {
            settings_file: settings_file.to_path_buf(),
            ..Default::default()
        };
        settings.apply(&mut config);

        if let Ok(url) = std::env::var(API_BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }
        if let Ok(token) = std::env::var(API_TOKEN_ENV) {
            if !token.trim().is_empty() {
                config.api_token = Some(token);
            }
        }

        config
    }

    /// Join a path onto the API base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn default_settings_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plancraft")
        .join("settings.json")
}

/// User-editable overrides persisted as JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub notice_ttl_ms: Option<u64>,
    pub max_consecutive_poll_failures: Option<u32>,
    pub refinement_enabled: Option<bool>,
}

impl Settings {
    /// Read settings from disk. A missing or unreadable file yields defaults.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed settings file");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, content)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(ref url) = self.api_base_url {
            config.api_base_url = url.clone();
        }
        if self.api_token.is_some() {
            config.api_token = self.api_token.clone();
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = self.notice_ttl_ms {
            config.notice_ttl = Duration::from_millis(ms);
        }
        if self.max_consecutive_poll_failures.is_some() {
            config.max_consecutive_poll_failures = self.max_consecutive_poll_failures;
        }
        if let Some(enabled) = self.refinement_enabled {
            config.refinement_enabled = enabled;
        }
    }
}
