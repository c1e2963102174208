pub mod audio;
pub mod config;
pub mod database;
pub mod error_log;
pub mod errors;
pub mod history;
pub mod library;
pub mod playback;
pub mod playlist;
pub mod settings;

use std::sync::Arc;

use sqlx::{Pool, Sqlite};

use config::AppConfig;
use database::DatabaseManager;
use error_log::ErrorLogManager;
use errors::AppError;
use history::PlayHistoryManager;
use playback::{MediaEngine, PlaybackSession, SessionConfig};
use playlist::PlaylistManager;
use settings::SettingsManager;

/// Every long-lived service, wired to one database.
pub struct AppState {
    pub config: AppConfig,
    pub pool: Pool<Sqlite>,
    pub playlists: Arc<PlaylistManager>,
    pub history: PlayHistoryManager,
    pub settings: SettingsManager,
    pub error_log: ErrorLogManager,
    pub session: PlaybackSession,
}

impl AppState {
    /// Opens the configured database and starts a playback session on
    /// `engine`. Needs a running tokio runtime.
    pub async fn open(config: AppConfig, engine: Arc<dyn MediaEngine>) -> Result<Self, AppError> {
        let db = DatabaseManager::open(&config.database_path()).await?;
        Ok(Self::with_pool(config, db.pool, engine))
    }

    pub fn with_pool(config: AppConfig, pool: Pool<Sqlite>, engine: Arc<dyn MediaEngine>) -> Self {
        let playlists = Arc::new(PlaylistManager::new(pool.clone()));
        let session = PlaybackSession::new(
            engine,
            playlists.clone(),
            pool.clone(),
            SessionConfig::from(&config),
        );

        Self {
            history: PlayHistoryManager::new(pool.clone()),
            settings: SettingsManager::new(pool.clone()),
            error_log: ErrorLogManager::new(pool.clone()),
            playlists,
            session,
            config,
            pool,
        }
    }

    /// Stops playback, saving the offset, and closes the database.
    pub async fn close(&self) -> Result<(), AppError> {
        self.session.shutdown().await?;
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::testing::FakeEngine;
    use crate::playback::StartMode;

    #[tokio::test]
    async fn test_app_state_shares_one_database() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let engine = Arc::new(FakeEngine::new());
        let app = AppState::with_pool(AppConfig::default(), db.pool, engine.clone());

        let dir = std::env::temp_dir().join(format!("tapedeck-app-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("episode.mkv");
        std::fs::write(&file, b"").unwrap();

        let playlist = app
            .playlists
            .create_playlist("Show", &[file.to_string_lossy().to_string()])
            .await
            .unwrap();
        let items = app.playlists.get_items(&playlist.id).await.unwrap();

        app.session.play(&items[0].id, StartMode::FromStart).await.unwrap();
        app.close().await.unwrap();

        assert_eq!(engine.count("release"), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
