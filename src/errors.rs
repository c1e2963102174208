use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "message")]
pub enum AppError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Playback engine error: {0}")]
    Engine(String),

    #[error("Database error: {0}")]
    Persistence(String),

    #[error("Invalid reorder request: {0}")]
    InvalidReorderRequest(ReorderRejection),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    Io(String),

    #[error("Playback session has been shut down")]
    SessionClosed,
}

/// Why a reorder request was refused. Every variant is detected before
/// anything is written.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "reason", content = "detail")]
pub enum ReorderRejection {
    #[error("playlist {0} does not exist")]
    UnknownPlaylist(String),

    #[error("item {0} is not an active item of this playlist")]
    ForeignItem(String),

    #[error("item {0} appears more than once")]
    DuplicateItem(String),

    #[error("ordering lists {given} items but the playlist has {expected}")]
    IncompleteOrdering { given: usize, expected: usize },

    #[error("source index {index} is out of range for {len} items")]
    SourceOutOfRange { index: usize, len: usize },

    #[error("item {0} cannot be dropped relative to itself")]
    SelfAnchored(String),
}

impl From<ReorderRejection> for AppError {
    fn from(e: ReorderRejection) -> Self {
        AppError::InvalidReorderRequest(e)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Config(format!("Serialization error: {}", e))
    }
}
