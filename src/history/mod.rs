pub mod models;

use crate::errors::AppError;
use models::{HistoryEntry, HistoryKind, HistoryView};
use sqlx::{Pool, Sqlite, SqliteConnection};
use uuid::Uuid;

pub struct PlayHistoryManager {
    pool: Pool<Sqlite>,
}

impl PlayHistoryManager {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Records that playback of an item began at `started_at`: bumps the
    /// item's and playlist's last-played time and appends a `started`
    /// entry, all or nothing.
    pub async fn record_play(
        &self,
        playlist_id: &str,
        item_id: &str,
        started_at: i64,
    ) -> Result<HistoryEntry, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Item and playlist statistics
        sqlx::query("UPDATE playlist_items SET last_played_at = ? WHERE id = ?")
            .bind(started_at)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE playlists SET last_played_at = ? WHERE id = ?")
            .bind(started_at)
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        // 2. History log
        let entry = append(&mut tx, playlist_id, item_id, started_at, HistoryKind::Started).await?;

        tx.commit().await?;

        log::info!("[PlayHistoryManager] Recorded start of item {} (playlist {})", item_id, playlist_id);
        Ok(entry)
    }

    /// Records a play-through. The entry carries the time playback started;
    /// `final_position_secs`, when given, becomes the item's stored offset
    /// in the same transaction.
    pub async fn record_completion(
        &self,
        playlist_id: &str,
        item_id: &str,
        started_at: i64,
        final_position_secs: Option<i64>,
    ) -> Result<HistoryEntry, AppError> {
        let mut tx = self.pool.begin().await?;

        let entry = append(&mut tx, playlist_id, item_id, started_at, HistoryKind::Completed).await?;

        if let Some(position) = final_position_secs {
            sqlx::query("UPDATE playlist_items SET position_secs = ? WHERE id = ?")
                .bind(position)
                .bind(item_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        log::info!("[PlayHistoryManager] Item {} played to the end", item_id);
        Ok(entry)
    }

    /// Newest first, capped at `limit`.
    pub async fn recent(&self, limit: i64) -> Result<Vec<HistoryView>, AppError> {
        Ok(sqlx::query_as::<_, HistoryView>(
            r#"
            SELECT
                h.id, h.played_at, h.kind,
                h.playlist_id, p.name as playlist_name,
                h.item_id, i.name as item_name
            FROM play_history h
            JOIN playlists p ON h.playlist_id = p.id
            JOIN playlist_items i ON h.item_id = i.id
            ORDER BY h.played_at DESC, h.rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn entries_for_item(&self, item_id: &str) -> Result<Vec<HistoryEntry>, AppError> {
        Ok(sqlx::query_as::<_, HistoryEntry>(
            "SELECT id, playlist_id, item_id, played_at, kind FROM play_history WHERE item_id = ? ORDER BY rowid ASC",
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_for_item(&self, item_id: &str) -> Result<i64, AppError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM play_history WHERE item_id = ?")
                .bind(item_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }
}

async fn append(
    conn: &mut SqliteConnection,
    playlist_id: &str,
    item_id: &str,
    played_at: i64,
    kind: HistoryKind,
) -> Result<HistoryEntry, AppError> {
    let entry = HistoryEntry {
        id: Uuid::new_v4().to_string(),
        playlist_id: playlist_id.to_string(),
        item_id: item_id.to_string(),
        played_at,
        kind,
    };

    sqlx::query(
        "INSERT INTO play_history (id, playlist_id, item_id, played_at, kind) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&entry.id)
    .bind(&entry.playlist_id)
    .bind(&entry.item_id)
    .bind(entry.played_at)
    .bind(entry.kind)
    .execute(&mut *conn)
    .await?;

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use crate::playlist::PlaylistManager;

    async fn setup() -> (PlayHistoryManager, PlaylistManager, String, Vec<String>) {
        let db = DatabaseManager::in_memory().await.unwrap();
        let playlists = PlaylistManager::new(db.pool.clone());
        let playlist = playlists
            .create_playlist(
                "Shows",
                &["/tv/one.mkv".to_string(), "/tv/two.mkv".to_string()],
            )
            .await
            .unwrap();
        let items = playlists
            .get_items(&playlist.id)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        (PlayHistoryManager::new(db.pool), playlists, playlist.id, items)
    }

    #[tokio::test]
    async fn test_record_play_updates_last_played() {
        let (history, playlists, playlist_id, items) = setup().await;

        let entry = history.record_play(&playlist_id, &items[0], 1_700_000_000).await.unwrap();
        assert_eq!(entry.kind, HistoryKind::Started);

        let item = playlists.get_item(&items[0]).await.unwrap();
        let playlist = playlists.get_playlist(&playlist_id).await.unwrap();
        assert_eq!(item.last_played_at, Some(1_700_000_000));
        assert_eq!(playlist.last_played_at, Some(1_700_000_000));
        assert_eq!(history.count_for_item(&items[0]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_completion_sets_final_position() {
        let (history, playlists, playlist_id, items) = setup().await;

        history
            .record_completion(&playlist_id, &items[1], 100, Some(120))
            .await
            .unwrap();
        assert_eq!(playlists.get_item(&items[1]).await.unwrap().position_secs, Some(120));

        // Without a known duration the offset stays where it was.
        playlists.update_item_position(&items[0], Some(7)).await.unwrap();
        history
            .record_completion(&playlist_id, &items[0], 100, None)
            .await
            .unwrap();
        assert_eq!(playlists.get_item(&items[0]).await.unwrap().position_secs, Some(7));

        let kinds: Vec<HistoryKind> = history
            .entries_for_item(&items[1])
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![HistoryKind::Completed]);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_capped() {
        let (history, _, playlist_id, items) = setup().await;

        history.record_play(&playlist_id, &items[0], 10).await.unwrap();
        history.record_play(&playlist_id, &items[1], 30).await.unwrap();
        history.record_completion(&playlist_id, &items[0], 10, None).await.unwrap();

        let recent = history.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].item_name, "two.mkv");
        assert_eq!(recent[0].playlist_name, "Shows");
        // Same timestamp: the later insert wins.
        assert_eq!(recent[1].kind, HistoryKind::Completed);
    }
}
