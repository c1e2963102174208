pub mod engine;
pub mod progress;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineEvent, EngineEventSink, MediaEngine};
pub use progress::StartMode;
pub use session::{PlaybackSession, PlaybackState, SessionConfig, SessionEvent};
