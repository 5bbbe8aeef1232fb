use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Client tunables. Every field has a default so a partial file is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Self-expiry of a typing flag
    pub typing_timeout_ms: u64,
    /// Keystroke inactivity before the typing flag is cleared
    pub typing_idle_ms: u64,
    /// Status text given to new profiles
    pub default_status: String,
    /// Channel id used for rendered notifications
    pub notification_channel: String,
    /// Pending snapshots a subscription may buffer
    pub subscription_buffer: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            typing_timeout_ms: 3000,
            typing_idle_ms: 2000,
            default_status: "Hey there! I am using ChatApp".to_string(),
            notification_channel: "chat-messages".to_string(),
            subscription_buffer: 32,
        }
    }
}

impl ChatConfig {
    pub fn typing_timeout(&self) -> Duration {
        Duration::from_millis(self.typing_timeout_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    /// Load `config.json` from `dir`, falling back to defaults when the file is absent
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(ChatConfig::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ChatConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Malformed config file {}", path.display()))?;
        if config.subscription_buffer == 0 {
            return Err(anyhow!("subscription_buffer must be at least 1"));
        }

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let file = fs::File::create(dir.join(CONFIG_FILE_NAME))?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_dir()?)
    }
}

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Point config lookups at `dir` instead of the platform config directory.
/// Only the first call has any effect.
pub fn set_config_dir_override(dir: PathBuf) {
    let _ = CONFIG_DIR_OVERRIDE.set(dir);
}

pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = CONFIG_DIR_OVERRIDE.get() {
        return Ok(dir.clone());
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("chatapp");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}
