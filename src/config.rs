use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::AppError;

pub const APP_DIR_NAME: &str = "tapedeck";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DATABASE_FILE_NAME: &str = "library.db";

pub const DEFAULT_POSITION_SYNC_MS: u64 = 1000;
pub const DEFAULT_DURATION_PROBE_ATTEMPTS: u32 = 10;
pub const DEFAULT_DURATION_PROBE_STEP_MS: u64 = 100;
pub const DEFAULT_HISTORY_LIMIT: i64 = 1000;

pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn get_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

pub fn get_config_file_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILE_NAME)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Overrides the default database location under the data dir.
    pub database_path: Option<PathBuf>,
    pub position_sync_interval_ms: u64,
    pub duration_probe_attempts: u32,
    pub duration_probe_step_ms: u64,
    pub history_limit: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            position_sync_interval_ms: DEFAULT_POSITION_SYNC_MS,
            duration_probe_attempts: DEFAULT_DURATION_PROBE_ATTEMPTS,
            duration_probe_step_ms: DEFAULT_DURATION_PROBE_STEP_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl AppConfig {
    /// Loads the user config, falling back to defaults when no file exists.
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(&get_config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::info!("[AppConfig] No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&raw)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        log::info!("[AppConfig] Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.position_sync_interval_ms == 0 {
            return Err(AppError::Config(
                "position_sync_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.history_limit <= 0 {
            return Err(AppError::Config(
                "history_limit must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| get_data_dir().join(DATABASE_FILE_NAME))
    }

    pub fn position_sync_interval(&self) -> Duration {
        Duration::from_millis(self.position_sync_interval_ms)
    }

    pub fn duration_probe_step(&self) -> Duration {
        Duration::from_millis(self.duration_probe_step_ms)
    }
}
