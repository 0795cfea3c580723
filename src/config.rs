use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "any-tracker";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    pub data_dir: PathBuf,
    pub app_version: String,
    pub add_new_list_top: bool,
    pub add_new_item_top: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            add_new_list_top: false,
            add_new_item_top: false,
        }
    }
}

impl TrackerConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|error| AppError::NotFound(format!("cannot read {}: {}", path.display(), error)))?;
        serde_json::from_str(&content)
            .map_err(|error| AppError::Corrupted(format!("invalid config {}: {}", path.display(), error)))
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            serde_json::to_string_pretty(self).map_err(|error| AppError::Serialization(error.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join(CONFIG_FILE)
    }

    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
}
