use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::database::now_secs;
use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ErrorLogEntry {
    pub id: String,
    pub playlist_id: Option<String>,
    pub item_id: Option<String>,
    pub logged_at: i64,
    pub message: String,
    pub detail: String,
}

/// Append-only diagnostics. Nothing in the app reads these back except
/// for display.
pub struct ErrorLogManager {
    pool: Pool<Sqlite>,
}

impl ErrorLogManager {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        playlist_id: Option<&str>,
        item_id: Option<&str>,
        message: &str,
        detail: &str,
    ) -> Result<ErrorLogEntry, AppError> {
        let entry = ErrorLogEntry {
            id: Uuid::new_v4().to_string(),
            playlist_id: playlist_id.map(str::to_string),
            item_id: item_id.map(str::to_string),
            logged_at: now_secs(),
            message: message.to_string(),
            detail: detail.to_string(),
        };

        sqlx::query(
            "INSERT INTO error_log (id, playlist_id, item_id, logged_at, message, detail) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.playlist_id)
        .bind(&entry.item_id)
        .bind(entry.logged_at)
        .bind(&entry.message)
        .bind(&entry.detail)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<ErrorLogEntry>, AppError> {
        Ok(sqlx::query_as::<_, ErrorLogEntry>(
            "SELECT * FROM error_log ORDER BY logged_at DESC, rowid DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    #[tokio::test]
    async fn test_record_and_read_back() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let log = ErrorLogManager::new(db.pool);

        log.record(None, None, "first", "").await.unwrap();
        log.record(Some("p"), Some("i"), "second", "decoder failed")
            .await
            .unwrap();

        let entries = log.recent(10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[0].item_id.as_deref(), Some("i"));
        assert_eq!(entries[1].playlist_id, None);

        assert_eq!(log.recent(1).await.unwrap().len(), 1);
    }
}
