use serde::{Deserialize, Serialize};

use crate::playback::progress::{self, StartMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub last_played_at: Option<i64>,
    /// May point at an item that has since been soft-deleted.
    pub selected_item_id: Option<String>,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlaylistItem {
    pub id: String,
    pub playlist_id: String,
    pub ordinal: i64,
    pub path: String,
    pub name: String,
    pub last_played_at: Option<i64>,
    /// Last known playback offset in seconds; `None` means start over.
    pub position_secs: Option<i64>,
    pub duration_ms: Option<i64>,
    pub deleted_at: Option<i64>,
}

impl PlaylistItem {
    pub fn progress_percent(&self) -> u8 {
        progress::progress_percent(self.position_secs, self.duration_ms)
    }

    pub fn is_finished(&self) -> bool {
        progress::is_finished(self.position_secs, self.duration_ms)
    }

    pub fn default_start_mode(&self) -> StartMode {
        progress::default_start_mode(self.position_secs, self.duration_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaylistSort {
    #[default]
    NameAsc,
    NameDesc,
    CreatedAsc,
    CreatedDesc,
    PlayedAsc,
    PlayedDesc,
}

impl PlaylistSort {
    pub(crate) fn order_by(self) -> &'static str {
        match self {
            PlaylistSort::NameAsc => "name COLLATE NOCASE ASC, created_at ASC",
            PlaylistSort::NameDesc => "name COLLATE NOCASE DESC, created_at DESC",
            PlaylistSort::CreatedAsc => "created_at ASC, rowid ASC",
            PlaylistSort::CreatedDesc => "created_at DESC, rowid DESC",
            PlaylistSort::PlayedAsc => "COALESCE(last_played_at, 0) ASC, name COLLATE NOCASE ASC",
            PlaylistSort::PlayedDesc => "COALESCE(last_played_at, 0) DESC, name COLLATE NOCASE ASC",
        }
    }
}

impl std::str::FromStr for PlaylistSort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" | "name_asc" => Ok(PlaylistSort::NameAsc),
            "name_desc" => Ok(PlaylistSort::NameDesc),
            "created" | "created_asc" => Ok(PlaylistSort::CreatedAsc),
            "created_desc" => Ok(PlaylistSort::CreatedDesc),
            "played" | "played_asc" => Ok(PlaylistSort::PlayedAsc),
            "played_desc" => Ok(PlaylistSort::PlayedDesc),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaylistEvent {
    PlaylistsChanged,
    ItemsChanged { playlist_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistDetails {
    pub playlist: Playlist,
    pub items: Vec<PlaylistItem>,
}
