use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Started,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryEntry {
    pub id: String,
    pub playlist_id: String,
    pub item_id: String,
    pub played_at: i64,
    pub kind: HistoryKind,
}

/// A history row joined with the names it refers to, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct HistoryView {
    pub id: String,
    pub played_at: i64,
    pub kind: HistoryKind,
    pub playlist_id: String,
    pub playlist_name: String,
    pub item_id: String,
    pub item_name: String,
}
