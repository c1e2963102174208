use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::errors::AppError;

/// Predicate every read of items or playlists must apply.
pub const ACTIVE: &str = "deleted_at IS NULL";

pub struct DatabaseManager {
    pub pool: Pool<Sqlite>,
}

impl DatabaseManager {
    pub async fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(dir) = db_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }

        log::info!("[DatabaseManager] Connecting to database at: {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true)
                    .foreign_keys(true),
            )
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to connect to database: {}", e)))?;

        apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; the connection is never
    /// recycled so the data lives as long as the pool.
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true))
            .await?;

        apply_schema(&pool).await?;
        Ok(Self { pool })
    }
}

async fn apply_schema(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    let schema = include_str!("schema.sql");

    for statement in schema.split(';') {
        let stmt = statement.trim();
        if stmt.is_empty() {
            continue;
        }
        sqlx::query(stmt).execute(pool).await.map_err(|e| {
            AppError::Persistence(format!("Failed to execute schema statement '{}': {}", stmt, e))
        })?;
    }

    Ok(())
}

pub fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}
