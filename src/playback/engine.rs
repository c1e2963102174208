//! The contract between the playback session and whatever actually
//! renders media.

use std::path::Path;
use tokio::sync::mpsc;

use crate::errors::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// First frame or sample of the loaded media reached the output.
    Started,
    EndReached,
    Error(String),
    PositionChanged(u64),
}

/// Handed to the engine on every load. Events are tagged with the load's
/// generation so the session can drop anything a previous load still
/// emits.
#[derive(Debug, Clone)]
pub struct EngineEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, EngineEvent)>,
}

impl EngineEventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, EngineEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: EngineEvent) {
        // The session may already be gone.
        let _ = self.tx.send((self.generation, event));
    }
}

/// A single-media player. Calls are expected to return quickly; long work
/// belongs on the engine's own threads, reported back through the sink.
pub trait MediaEngine: Send + Sync {
    fn load(&self, path: &Path, events: EngineEventSink) -> Result<(), AppError>;
    fn play(&self) -> Result<(), AppError>;
    fn pause(&self) -> Result<(), AppError>;
    fn stop(&self);
    fn seek(&self, position_ms: u64) -> Result<(), AppError>;
    fn position_ms(&self) -> u64;
    /// `None` until the media's length is known.
    fn duration_ms(&self) -> Option<u64>;
    /// Frees native resources. Called at most once per session.
    fn release(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_events_with_its_load() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let old = EngineEventSink::new(1, tx.clone());
        let current = EngineEventSink::new(2, tx);
        assert_eq!(current.generation(), 2);

        old.emit(EngineEvent::EndReached);
        current.emit(EngineEvent::Started);

        assert_eq!(rx.try_recv().unwrap(), (1, EngineEvent::EndReached));
        assert_eq!(rx.try_recv().unwrap(), (2, EngineEvent::Started));
    }
}
