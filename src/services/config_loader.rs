use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct PresentationConfig {
    /// How long each slide of the rotating detail view stays up.
    #[serde(default = "default_slide_seconds")]
    pub slide_seconds: u64,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            slide_seconds: default_slide_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_poll_interval_seconds", alias = "poll_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Holds the roster and the runtime log between runs.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub presentation: PresentationConfig,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            poll_interval_seconds: default_poll_interval_seconds(),
            request_timeout_seconds: default_request_timeout_seconds(),
            state_dir: default_state_dir(),
            presentation: PresentationConfig::default(),
        }
    }
}

impl BoardConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds.max(1))
    }

    pub fn slide_interval(&self) -> Duration {
        Duration::from_secs(self.presentation.slide_seconds.max(1))
    }
}

fn default_api_base_url() -> String {
    "https://cbp-data.ngo.sh".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    30
}

fn default_request_timeout_seconds() -> u64 {
    10
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".cyberboard")
}

fn default_slide_seconds() -> u64 {
    5
}

pub fn load_board_config(config_path: &Path) -> Result<BoardConfig, String> {
    if !config_path.exists() {
        info!(
            "config.toml not found, using defaults: {}",
            config_path.display()
        );
        return Ok(BoardConfig::default());
    }

    let raw = fs::read_to_string(config_path).map_err(|err| {
        format!(
            "Failed to read config.toml at {}: {}",
            config_path.display(),
            err
        )
    })?;

    toml::from_str::<BoardConfig>(&raw).map_err(|err| {
        format!(
            "Failed to parse config.toml at {}: {}",
            config_path.display(),
            err
        )
    })
}
