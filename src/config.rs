//! Sync client configuration.
//!
//! Defaults match the hosted Leadline API; everything can be overridden
//! through environment variables or mutated before handing the config to
//! the transport and monitor.

use std::path::PathBuf;
use std::time::Duration;

/// Fixed period between poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for the sync transport and monitor.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the Leadline API
    pub base_url: String,
    /// Bearer token attached to every request, when the session has one
    pub auth_token: Option<String>,
    /// Fixed period between poll ticks
    pub poll_interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Where the last observed job snapshot is persisted
    pub state_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.leadline.app".to_string(),
            auth_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            state_path: default_state_path(),
        }
    }
}

impl SyncConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("LEADLINE_API_URL") {
            if !url.is_empty() {
                config.base_url = url;
            }
        }

        if let Ok(token) = std::env::var("LEADLINE_API_TOKEN") {
            if !token.is_empty() {
                config.auth_token = Some(token);
            }
        }

        if let Some(ms) = std::env::var("LEADLINE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Ok(path) = std::env::var("LEADLINE_STATE_PATH") {
            if !path.is_empty() {
                config.state_path = PathBuf::from(path);
            }
        }

        config
    }
}

/// Default location of the persisted job snapshot.
pub fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("leadline")
        .join("sync-job.json")
}
