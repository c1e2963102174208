pub mod manager;
pub mod models;
pub mod reorder;

pub use manager::PlaylistManager;
pub use models::{Playlist, PlaylistDetails, PlaylistEvent, PlaylistItem, PlaylistSort};
pub use reorder::{MoveRequest, Placement, ReorderOutcome};
