use super::models::{Playlist, PlaylistDetails, PlaylistEvent, PlaylistItem, PlaylistSort};
use super::reorder::{plan_reorder, MoveRequest, ReorderOutcome};
use crate::database::{now_secs, ACTIVE};
use crate::errors::{AppError, ReorderRejection};
use crate::library::display_name;
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::HashSet;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

pub struct PlaylistManager {
    pool: Pool<Sqlite>,
    events: broadcast::Sender<PlaylistEvent>,
    /// Held across every transaction that reads the ordering it rewrites.
    write_gate: Mutex<()>,
}

impl PlaylistManager {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            pool,
            events,
            write_gate: Mutex::new(()),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: PlaylistEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    pub async fn create_playlist(&self, name: &str, paths: &[String]) -> Result<Playlist, AppError> {
        let name = non_blank(name, "playlist name")?;
        let id = Uuid::new_v4().to_string();
        let now = now_secs();

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        lock_for_write(&mut tx).await?;

        sqlx::query("INSERT INTO playlists (id, name, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        append_items(&mut tx, &id, paths).await?;

        let playlist = sqlx::query_as::<_, Playlist>("SELECT * FROM playlists WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!("[PlaylistManager] Created '{}' with {} items", playlist.name, paths.len());
        self.notify(PlaylistEvent::PlaylistsChanged);
        Ok(playlist)
    }

    pub async fn get_playlists(
        &self,
        search: Option<&str>,
        sort: PlaylistSort,
    ) -> Result<Vec<Playlist>, AppError> {
        let search = search.map(str::trim).filter(|s| !s.is_empty());

        let playlists = match search {
            Some(term) => {
                let sql = format!(
                    "SELECT * FROM playlists WHERE {} AND instr(lower(name), lower(?)) > 0 ORDER BY {}",
                    ACTIVE,
                    sort.order_by()
                );
                sqlx::query_as::<_, Playlist>(&sql)
                    .bind(term)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT * FROM playlists WHERE {} ORDER BY {}",
                    ACTIVE,
                    sort.order_by()
                );
                sqlx::query_as::<_, Playlist>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(playlists)
    }

    pub async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist, AppError> {
        let sql = format!("SELECT * FROM playlists WHERE id = ? AND {}", ACTIVE);
        sqlx::query_as::<_, Playlist>(&sql)
            .bind(playlist_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("playlist {}", playlist_id)))
    }

    pub async fn get_playlist_details(&self, playlist_id: &str) -> Result<PlaylistDetails, AppError> {
        let playlist = self.get_playlist(playlist_id).await?;
        let items = self.get_items(playlist_id).await?;
        Ok(PlaylistDetails { playlist, items })
    }

    pub async fn rename_playlist(&self, playlist_id: &str, name: &str) -> Result<(), AppError> {
        let name = non_blank(name, "playlist name")?;
        let sql = format!("UPDATE playlists SET name = ? WHERE id = ? AND {}", ACTIVE);
        let result = sqlx::query(&sql)
            .bind(name)
            .bind(playlist_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("playlist {}", playlist_id)));
        }

        self.notify(PlaylistEvent::PlaylistsChanged);
        Ok(())
    }

    /// Soft-deletes the playlist together with its active items.
    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<(), AppError> {
        let now = now_secs();
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;

        let sql = format!("UPDATE playlists SET deleted_at = ? WHERE id = ? AND {}", ACTIVE);
        let result = sqlx::query(&sql)
            .bind(now)
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("playlist {}", playlist_id)));
        }

        let sql = format!(
            "UPDATE playlist_items SET deleted_at = ? WHERE playlist_id = ? AND {}",
            ACTIVE
        );
        sqlx::query(&sql)
            .bind(now)
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!("[PlaylistManager] Deleted playlist {}", playlist_id);
        self.notify(PlaylistEvent::PlaylistsChanged);
        Ok(())
    }

    pub async fn get_items(&self, playlist_id: &str) -> Result<Vec<PlaylistItem>, AppError> {
        let sql = format!(
            "SELECT * FROM playlist_items WHERE playlist_id = ? AND {} ORDER BY ordinal ASC",
            ACTIVE
        );
        Ok(sqlx::query_as::<_, PlaylistItem>(&sql)
            .bind(playlist_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn get_item(&self, item_id: &str) -> Result<PlaylistItem, AppError> {
        let sql = format!("SELECT * FROM playlist_items WHERE id = ? AND {}", ACTIVE);
        sqlx::query_as::<_, PlaylistItem>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {}", item_id)))
    }

    pub async fn add_items(&self, playlist_id: &str, paths: &[String]) -> Result<Vec<PlaylistItem>, AppError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        lock_for_write(&mut tx).await?;
        ensure_playlist(&mut tx, playlist_id).await?;
        let added = append_items(&mut tx, playlist_id, paths).await?;
        tx.commit().await?;

        self.notify(PlaylistEvent::ItemsChanged {
            playlist_id: playlist_id.to_string(),
        });
        Ok(added)
    }

    /// Soft-deletes an item and closes the gap it leaves in the ordering.
    pub async fn remove_item(&self, item_id: &str) -> Result<(), AppError> {
        let _gate = self.write_gate.lock().await;
        let item = self.get_item(item_id).await?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE playlist_items SET deleted_at = ? WHERE id = ?")
            .bind(now_secs())
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        let survivors = active_ids(&mut tx, &item.playlist_id).await?;
        write_order(&mut tx, &item.playlist_id, &survivors).await?;

        tx.commit().await?;

        self.notify(PlaylistEvent::ItemsChanged {
            playlist_id: item.playlist_id,
        });
        Ok(())
    }

    pub async fn rename_item(&self, item_id: &str, name: &str) -> Result<(), AppError> {
        let name = non_blank(name, "item name")?;
        let item = self.get_item(item_id).await?;

        sqlx::query("UPDATE playlist_items SET name = ? WHERE id = ?")
            .bind(name)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        self.notify(PlaylistEvent::ItemsChanged {
            playlist_id: item.playlist_id,
        });
        Ok(())
    }

    /// Brings a playlist in line with an edited file list. Items whose path
    /// is still listed keep their id, order and progress; dropped paths are
    /// soft-deleted and new paths are appended in the order given.
    pub async fn sync_items(
        &self,
        playlist_id: &str,
        name: &str,
        paths: &[String],
    ) -> Result<PlaylistDetails, AppError> {
        let name = non_blank(name, "playlist name")?;
        let wanted: HashSet<&str> = paths.iter().map(String::as_str).collect();

        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        lock_for_write(&mut tx).await?;
        ensure_playlist(&mut tx, playlist_id).await?;

        sqlx::query("UPDATE playlists SET name = ? WHERE id = ?")
            .bind(name)
            .bind(playlist_id)
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "SELECT * FROM playlist_items WHERE playlist_id = ? AND {} ORDER BY ordinal ASC",
            ACTIVE
        );
        let existing = sqlx::query_as::<_, PlaylistItem>(&sql)
            .bind(playlist_id)
            .fetch_all(&mut *tx)
            .await?;

        let now = now_secs();
        let mut kept = Vec::new();
        let mut known: HashSet<String> = HashSet::new();
        for item in existing {
            if wanted.contains(item.path.as_str()) && known.insert(item.path.clone()) {
                kept.push(item.id);
            } else {
                sqlx::query("UPDATE playlist_items SET deleted_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(&item.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        write_order(&mut tx, playlist_id, &kept).await?;

        let fresh: Vec<String> = paths
            .iter()
            .filter(|path| known.insert((*path).clone()))
            .cloned()
            .collect();
        append_items(&mut tx, playlist_id, &fresh).await?;

        tx.commit().await?;

        log::info!(
            "[PlaylistManager] Synced {}: kept {}, added {}",
            playlist_id,
            kept.len(),
            fresh.len()
        );
        self.notify(PlaylistEvent::PlaylistsChanged);
        self.notify(PlaylistEvent::ItemsChanged {
            playlist_id: playlist_id.to_string(),
        });

        self.get_playlist_details(playlist_id).await
    }

    pub async fn set_selected_item(&self, playlist_id: &str, item_id: Option<&str>) -> Result<(), AppError> {
        if let Some(item_id) = item_id {
            let item = self.get_item(item_id).await?;
            if item.playlist_id != playlist_id {
                return Err(AppError::InvalidInput(format!(
                    "item {} does not belong to playlist {}",
                    item_id, playlist_id
                )));
            }
        }

        let sql = format!("UPDATE playlists SET selected_item_id = ? WHERE id = ? AND {}", ACTIVE);
        let result = sqlx::query(&sql)
            .bind(item_id)
            .bind(playlist_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("playlist {}", playlist_id)));
        }
        Ok(())
    }

    /// The remembered selection, if it still points at an active item.
    pub async fn selected_item(&self, playlist_id: &str) -> Result<Option<PlaylistItem>, AppError> {
        let playlist = self.get_playlist(playlist_id).await?;
        let Some(item_id) = playlist.selected_item_id else {
            return Ok(None);
        };

        let sql = format!(
            "SELECT * FROM playlist_items WHERE id = ? AND playlist_id = ? AND {}",
            ACTIVE
        );
        Ok(sqlx::query_as::<_, PlaylistItem>(&sql)
            .bind(item_id)
            .bind(playlist_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn update_item_position(&self, item_id: &str, position_secs: Option<i64>) -> Result<(), AppError> {
        let item = self.get_item(item_id).await?;

        sqlx::query("UPDATE playlist_items SET position_secs = ? WHERE id = ?")
            .bind(position_secs)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        self.notify(PlaylistEvent::ItemsChanged {
            playlist_id: item.playlist_id,
        });
        Ok(())
    }

    pub async fn set_item_duration(&self, item_id: &str, duration_ms: i64) -> Result<(), AppError> {
        if duration_ms <= 0 {
            return Err(AppError::InvalidInput(format!(
                "duration must be positive, got {}",
                duration_ms
            )));
        }
        let item = self.get_item(item_id).await?;

        sqlx::query("UPDATE playlist_items SET duration_ms = ? WHERE id = ?")
            .bind(duration_ms)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        self.notify(PlaylistEvent::ItemsChanged {
            playlist_id: item.playlist_id,
        });
        Ok(())
    }

    /// Applies a reorder request. Invalid requests are rejected before any
    /// write, and a request that changes nothing writes nothing.
    pub async fn reorder_items(
        &self,
        playlist_id: &str,
        request: &MoveRequest,
    ) -> Result<ReorderOutcome, AppError> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.pool.begin().await?;
        lock_for_write(&mut tx).await?;

        ensure_playlist(&mut tx, playlist_id)
            .await
            .map_err(|e| match e {
                AppError::NotFound(_) => {
                    AppError::from(ReorderRejection::UnknownPlaylist(playlist_id.to_string()))
                }
                other => other,
            })?;

        let current = active_ids(&mut tx, playlist_id).await?;
        let Some(next) = plan_reorder(&current, request)? else {
            return Ok(ReorderOutcome::Unchanged);
        };

        write_order(&mut tx, playlist_id, &next).await?;
        tx.commit().await?;

        log::debug!("[PlaylistManager] Reordered {} ({} items)", playlist_id, next.len());
        self.notify(PlaylistEvent::ItemsChanged {
            playlist_id: playlist_id.to_string(),
        });
        Ok(ReorderOutcome::Reordered(next))
    }
}

fn non_blank<'a>(value: &'a str, what: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidInput(format!("{} must not be blank", what)));
    }
    Ok(trimmed)
}

/// Takes the database write lock before the first read, so writers outside
/// this manager cannot commit between that read and the writes based on it.
async fn lock_for_write(conn: &mut SqliteConnection) -> Result<(), AppError> {
    sqlx::query("UPDATE playlists SET id = id WHERE 0")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn ensure_playlist(conn: &mut SqliteConnection, playlist_id: &str) -> Result<(), AppError> {
    let sql = format!("SELECT COUNT(*) FROM playlists WHERE id = ? AND {}", ACTIVE);
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(playlist_id)
        .fetch_one(&mut *conn)
        .await?;

    if count == 0 {
        return Err(AppError::NotFound(format!("playlist {}", playlist_id)));
    }
    Ok(())
}

async fn active_ids(conn: &mut SqliteConnection, playlist_id: &str) -> Result<Vec<String>, AppError> {
    let sql = format!(
        "SELECT id FROM playlist_items WHERE playlist_id = ? AND {} ORDER BY ordinal ASC",
        ACTIVE
    );
    Ok(sqlx::query_scalar::<_, String>(&sql)
        .bind(playlist_id)
        .fetch_all(&mut *conn)
        .await?)
}

/// Rewrites active ordinals so that `ids[i]` gets ordinal `i`.
async fn write_order(conn: &mut SqliteConnection, playlist_id: &str, ids: &[String]) -> Result<(), AppError> {
    // Park every active ordinal below zero first; the unique index is
    // checked row by row, so assigning in place could collide midway.
    let sql = format!(
        "UPDATE playlist_items SET ordinal = -1 - ordinal WHERE playlist_id = ? AND {}",
        ACTIVE
    );
    sqlx::query(&sql)
        .bind(playlist_id)
        .execute(&mut *conn)
        .await?;

    for (ordinal, id) in ids.iter().enumerate() {
        sqlx::query("UPDATE playlist_items SET ordinal = ? WHERE id = ?")
            .bind(ordinal as i64)
            .bind(id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn append_items(
    conn: &mut SqliteConnection,
    playlist_id: &str,
    paths: &[String],
) -> Result<Vec<PlaylistItem>, AppError> {
    let sql = format!(
        "SELECT COALESCE(MAX(ordinal), -1) FROM playlist_items WHERE playlist_id = ? AND {}",
        ACTIVE
    );
    let last: i64 = sqlx::query_scalar(&sql)
        .bind(playlist_id)
        .fetch_one(&mut *conn)
        .await?;

    let mut added = Vec::with_capacity(paths.len());
    for (offset, path) in paths.iter().enumerate() {
        let item = PlaylistItem {
            id: Uuid::new_v4().to_string(),
            playlist_id: playlist_id.to_string(),
            ordinal: last + 1 + offset as i64,
            path: path.clone(),
            name: display_name(path),
            last_played_at: None,
            position_secs: None,
            duration_ms: None,
            deleted_at: None,
        };

        sqlx::query(
            "INSERT INTO playlist_items (id, playlist_id, ordinal, path, name) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&item.id)
        .bind(&item.playlist_id)
        .bind(item.ordinal)
        .bind(&item.path)
        .bind(&item.name)
        .execute(&mut *conn)
        .await?;

        added.push(item);
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use crate::playlist::reorder::Placement;

    async fn setup() -> (PlaylistManager, Pool<Sqlite>) {
        let db = DatabaseManager::in_memory().await.unwrap();
        (PlaylistManager::new(db.pool.clone()), db.pool)
    }

    fn paths(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| format!("/media/{}.mkv", n)).collect()
    }

    async fn names(manager: &PlaylistManager, playlist_id: &str) -> Vec<String> {
        manager
            .get_items(playlist_id)
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.name)
            .collect()
    }

    fn drain(rx: &mut broadcast::Receiver<PlaylistEvent>) -> Vec<PlaylistEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_create_assigns_dense_ordinals_and_file_names() {
        let (manager, _) = setup().await;
        let playlist = manager
            .create_playlist("Series", &paths(&["A", "B", "C"]))
            .await
            .unwrap();

        let items = manager.get_items(&playlist.id).await.unwrap();
        let ordinals: Vec<i64> = items.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(items[0].name, "A.mkv");
        assert!(items.iter().all(|i| i.position_secs.is_none()));
    }

    #[tokio::test]
    async fn test_blank_names_are_rejected() {
        let (manager, _) = setup().await;
        assert!(matches!(
            manager.create_playlist("   ", &[]).await,
            Err(AppError::InvalidInput(_))
        ));

        let playlist = manager.create_playlist("Ok", &[]).await.unwrap();
        assert!(matches!(
            manager.rename_playlist(&playlist.id, "").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_reorder_persists_and_notifies() {
        let (manager, _) = setup().await;
        let playlist = manager
            .create_playlist("P", &paths(&["A", "B", "C", "D", "E"]))
            .await
            .unwrap();
        let mut rx = manager.subscribe();

        let outcome = manager
            .reorder_items(&playlist.id, &MoveRequest::Index { source: 0, target: 3 })
            .await
            .unwrap();
        assert!(matches!(outcome, ReorderOutcome::Reordered(_)));
        assert_eq!(
            names(&manager, &playlist.id).await,
            vec!["B.mkv", "C.mkv", "D.mkv", "A.mkv", "E.mkv"]
        );
        assert_eq!(
            drain(&mut rx),
            vec![PlaylistEvent::ItemsChanged {
                playlist_id: playlist.id.clone()
            }]
        );
    }

    #[tokio::test]
    async fn test_noop_reorder_writes_nothing() {
        let (manager, _) = setup().await;
        let playlist = manager
            .create_playlist("P", &paths(&["A", "B", "C"]))
            .await
            .unwrap();
        let mut rx = manager.subscribe();

        let outcome = manager
            .reorder_items(&playlist.id, &MoveRequest::Slot { source: 1, slot: 2 })
            .await
            .unwrap();
        assert_eq!(outcome, ReorderOutcome::Unchanged);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(names(&manager, &playlist.id).await, vec!["A.mkv", "B.mkv", "C.mkv"]);
    }

    #[tokio::test]
    async fn test_rejected_reorder_leaves_order_intact() {
        let (manager, _) = setup().await;
        let first = manager.create_playlist("One", &paths(&["A", "B"])).await.unwrap();
        let second = manager.create_playlist("Two", &paths(&["X"])).await.unwrap();
        let foreign = manager.get_items(&second.id).await.unwrap()[0].id.clone();
        let own = manager.get_items(&first.id).await.unwrap()[0].id.clone();

        let err = manager
            .reorder_items(
                &first.id,
                &MoveRequest::Relative {
                    item_id: own,
                    anchor_id: foreign.clone(),
                    placement: Placement::After,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::InvalidReorderRequest(ReorderRejection::ForeignItem(foreign))
        );

        let err = manager
            .reorder_items("missing", &MoveRequest::Index { source: 0, target: 1 })
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::InvalidReorderRequest(ReorderRejection::UnknownPlaylist("missing".into()))
        );

        assert_eq!(names(&manager, &first.id).await, vec!["A.mkv", "B.mkv"]);
    }

    #[tokio::test]
    async fn test_remove_renumbers_and_ignores_deleted_in_reorder() {
        let (manager, pool) = setup().await;
        let playlist = manager
            .create_playlist("P", &paths(&["A", "B", "C", "D"]))
            .await
            .unwrap();
        let items = manager.get_items(&playlist.id).await.unwrap();

        manager.remove_item(&items[1].id).await.unwrap();

        let remaining = manager.get_items(&playlist.id).await.unwrap();
        let ordinals: Vec<i64> = remaining.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert!(matches!(
            manager.get_item(&items[1].id).await,
            Err(AppError::NotFound(_))
        ));

        // The removed item is not part of the active set any more.
        let full = vec![items[3].id.clone(), items[0].id.clone(), items[2].id.clone()];
        manager
            .reorder_items(&playlist.id, &MoveRequest::Full(full))
            .await
            .unwrap();
        assert_eq!(names(&manager, &playlist.id).await, vec!["D.mkv", "A.mkv", "C.mkv"]);

        let with_deleted = vec![
            items[1].id.clone(),
            items[3].id.clone(),
            items[0].id.clone(),
        ];
        assert!(manager
            .reorder_items(&playlist.id, &MoveRequest::Full(with_deleted))
            .await
            .is_err());

        // Soft-deleted row keeps its stale ordinal.
        let stale: i64 = sqlx::query_scalar("SELECT ordinal FROM playlist_items WHERE id = ?")
            .bind(&items[1].id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stale, 1);
    }

    #[tokio::test]
    async fn test_sync_keeps_progress_of_surviving_items() {
        let (manager, _) = setup().await;
        let playlist = manager
            .create_playlist("Old", &paths(&["A", "B", "C"]))
            .await
            .unwrap();
        let items = manager.get_items(&playlist.id).await.unwrap();
        manager.update_item_position(&items[2].id, Some(42)).await.unwrap();

        let details = manager
            .sync_items(&playlist.id, "New", &paths(&["C", "D", "A"]))
            .await
            .unwrap();

        assert_eq!(details.playlist.name, "New");
        let synced: Vec<(&str, i64, Option<i64>)> = details
            .items
            .iter()
            .map(|i| (i.name.as_str(), i.ordinal, i.position_secs))
            .collect();
        assert_eq!(
            synced,
            vec![("A.mkv", 0, None), ("C.mkv", 1, Some(42)), ("D.mkv", 2, None)]
        );
        assert_eq!(details.items[1].id, items[2].id);
    }

    #[tokio::test]
    async fn test_search_and_sort() {
        let (manager, _) = setup().await;
        manager.create_playlist("beta", &[]).await.unwrap();
        manager.create_playlist("Alpha", &[]).await.unwrap();
        manager.create_playlist("Gamma ray", &[]).await.unwrap();

        let all: Vec<String> = manager
            .get_playlists(None, PlaylistSort::NameAsc)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(all, vec!["Alpha", "beta", "Gamma ray"]);

        let desc: Vec<String> = manager
            .get_playlists(None, PlaylistSort::NameDesc)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(desc, vec!["Gamma ray", "beta", "Alpha"]);

        let found = manager
            .get_playlists(Some("A R"), PlaylistSort::NameAsc)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Gamma ray");
    }

    #[tokio::test]
    async fn test_delete_playlist_cascades() {
        let (manager, _) = setup().await;
        let playlist = manager.create_playlist("P", &paths(&["A"])).await.unwrap();
        let item = manager.get_items(&playlist.id).await.unwrap().remove(0);

        manager.delete_playlist(&playlist.id).await.unwrap();

        assert!(manager
            .get_playlists(None, PlaylistSort::default())
            .await
            .unwrap()
            .is_empty());
        assert!(matches!(manager.get_item(&item.id).await, Err(AppError::NotFound(_))));
        assert!(matches!(
            manager.delete_playlist(&playlist.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_selection_forgets_deleted_items() {
        let (manager, _) = setup().await;
        let playlist = manager.create_playlist("P", &paths(&["A", "B"])).await.unwrap();
        let items = manager.get_items(&playlist.id).await.unwrap();

        manager
            .set_selected_item(&playlist.id, Some(&items[1].id))
            .await
            .unwrap();
        assert_eq!(
            manager.selected_item(&playlist.id).await.unwrap().map(|i| i.id),
            Some(items[1].id.clone())
        );

        manager.remove_item(&items[1].id).await.unwrap();
        assert_eq!(manager.selected_item(&playlist.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_items_appends() {
        let (manager, _) = setup().await;
        let playlist = manager.create_playlist("P", &paths(&["A"])).await.unwrap();
        let added = manager.add_items(&playlist.id, &paths(&["B", "C"])).await.unwrap();

        assert_eq!(added.iter().map(|i| i.ordinal).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            names(&manager, &playlist.id).await,
            vec!["A.mkv", "B.mkv", "C.mkv"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_edits_on_file_database_all_succeed() {
        let dir = std::env::temp_dir().join(format!("tapedeck-concurrent-{}", Uuid::new_v4()));
        let db = DatabaseManager::open(&dir.join("library.db")).await.unwrap();
        let manager = std::sync::Arc::new(PlaylistManager::new(db.pool.clone()));

        let seed: Vec<String> = (0..12).map(|i| format!("/media/seed-{}.mkv", i)).collect();
        let playlist = manager.create_playlist("Busy", &seed).await.unwrap();
        let first = manager.get_items(&playlist.id).await.unwrap()[0].id.clone();

        for round in 0..15 {
            let mut tasks = Vec::new();
            for k in 0..2 {
                let m = manager.clone();
                let id = playlist.id.clone();
                tasks.push(tokio::spawn(async move {
                    m.reorder_items(&id, &MoveRequest::Index { source: 0, target: 10 + k })
                        .await
                        .map(|_| ())
                }));

                let m = manager.clone();
                let id = playlist.id.clone();
                let path = format!("/media/round-{}-{}.mkv", round, k);
                tasks.push(tokio::spawn(async move {
                    m.add_items(&id, &[path]).await.map(|_| ())
                }));
            }

            // A position write from playback races the ordinal edits.
            let m = manager.clone();
            let item = first.clone();
            tasks.push(tokio::spawn(async move {
                m.update_item_position(&item, Some(round)).await
            }));

            for task in tasks {
                task.await.unwrap().unwrap();
            }
        }

        let items = manager.get_items(&playlist.id).await.unwrap();
        assert_eq!(items.len(), 12 + 15 * 2);
        let ordinals: Vec<i64> = items.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, (0..items.len() as i64).collect::<Vec<_>>());

        db.pool.close().await;
        let _ = std::fs::remove_dir_all(&dir);
    }
}
