use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::fmt;
use std::str::FromStr;

use crate::errors::AppError;

pub const FULLSCREEN_BEHAVIOR: &str = "FullscreenBehavior";
pub const SELECTED_PLAYLIST_ID: &str = "SelectedPlaylistId";
pub const RUN_ON_STARTUP: &str = "RunOnStartup";

/// Whether playback should take over the screen when it starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FullscreenBehavior {
    /// Enter fullscreen on play.
    #[default]
    Auto,
    /// Keep the window as it is.
    Default,
}

impl FullscreenBehavior {
    pub fn enters_fullscreen(self) -> bool {
        matches!(self, FullscreenBehavior::Auto)
    }
}

impl fmt::Display for FullscreenBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullscreenBehavior::Auto => write!(f, "Auto"),
            FullscreenBehavior::Default => write!(f, "Default"),
        }
    }
}

impl FromStr for FullscreenBehavior {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(FullscreenBehavior::Auto),
            "default" => Ok(FullscreenBehavior::Default),
            other => Err(AppError::InvalidInput(format!(
                "unknown fullscreen behavior '{}'",
                other
            ))),
        }
    }
}

pub struct SettingsManager {
    pool: Pool<Sqlite>,
}

impl SettingsManager {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        log::debug!("[SettingsManager] {} = {}", key, value);
        Ok(())
    }

    /// Unknown stored values fall back to the default instead of failing
    /// playback.
    pub async fn fullscreen_behavior(&self) -> Result<FullscreenBehavior, AppError> {
        let Some(raw) = self.get(FULLSCREEN_BEHAVIOR).await? else {
            return Ok(FullscreenBehavior::default());
        };
        Ok(raw.parse().unwrap_or_else(|_| {
            log::warn!("[SettingsManager] Ignoring invalid {} value '{}'", FULLSCREEN_BEHAVIOR, raw);
            FullscreenBehavior::default()
        }))
    }

    pub async fn set_fullscreen_behavior(&self, behavior: FullscreenBehavior) -> Result<(), AppError> {
        self.set(FULLSCREEN_BEHAVIOR, &behavior.to_string()).await
    }

    pub async fn selected_playlist_id(&self) -> Result<Option<String>, AppError> {
        Ok(self
            .get(SELECTED_PLAYLIST_ID)
            .await?
            .filter(|id| !id.is_empty()))
    }

    pub async fn set_selected_playlist_id(&self, playlist_id: Option<&str>) -> Result<(), AppError> {
        self.set(SELECTED_PLAYLIST_ID, playlist_id.unwrap_or("")).await
    }

    pub async fn run_on_startup(&self) -> Result<bool, AppError> {
        Ok(self
            .get(RUN_ON_STARTUP)
            .await?
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false))
    }

    pub async fn set_run_on_startup(&self, enabled: bool) -> Result<(), AppError> {
        self.set(RUN_ON_STARTUP, if enabled { "true" } else { "false" })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    async fn settings() -> SettingsManager {
        let db = DatabaseManager::in_memory().await.unwrap();
        SettingsManager::new(db.pool)
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let settings = settings().await;
        assert_eq!(settings.fullscreen_behavior().await.unwrap(), FullscreenBehavior::Auto);
        assert_eq!(settings.selected_playlist_id().await.unwrap(), None);
        assert!(!settings.run_on_startup().await.unwrap());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let settings = settings().await;
        settings.set_fullscreen_behavior(FullscreenBehavior::Default).await.unwrap();
        settings.set_selected_playlist_id(Some("abc")).await.unwrap();
        settings.set_run_on_startup(true).await.unwrap();
        settings.set_selected_playlist_id(Some("def")).await.unwrap();

        assert_eq!(settings.get(FULLSCREEN_BEHAVIOR).await.unwrap().as_deref(), Some("Default"));
        assert!(!settings.fullscreen_behavior().await.unwrap().enters_fullscreen());
        assert_eq!(settings.selected_playlist_id().await.unwrap().as_deref(), Some("def"));
        assert!(settings.run_on_startup().await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_value_falls_back() {
        let settings = settings().await;
        settings.set(FULLSCREEN_BEHAVIOR, "sideways").await.unwrap();
        assert_eq!(settings.fullscreen_behavior().await.unwrap(), FullscreenBehavior::Auto);
    }
}
