use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use symphonia::core::codecs::Decoder;
use symphonia::core::formats::FormatReader;

use crate::playback::EngineEventSink;

/// Ring buffer size in interleaved stereo samples.
pub const BUFFER_SIZE: usize = 65536;

/// Samples that must be free before another packet is decoded, and the
/// fill level below which the ring counts as drained.
pub const DECODE_HEADROOM: usize = 4096;

/// Everything produced by probing a file, ready for the decoder thread.
pub struct OpenedMedia {
    pub reader: Box<dyn FormatReader>,
    pub decoder: Box<dyn Decoder>,
    pub track_id: u32,
    pub sample_rate: u32,
    pub duration_frames: Option<u64>,
}

pub enum DecoderCommand {
    Load {
        media: OpenedMedia,
        events: EngineEventSink,
    },
    Seek(u64),
    Stop,
}

/// Counters shared by the engine handle, the decoder and the output.
#[derive(Clone)]
pub struct EngineState {
    pub is_playing: Arc<AtomicBool>,
    /// Source position the current run of output frames started from.
    pub position_base_ms: Arc<AtomicU64>,
    /// Frames handed to the device since the last load or seek.
    pub played_frames: Arc<AtomicU64>,
    pub duration_frames: Arc<AtomicU64>,
    pub sample_rate: Arc<AtomicU64>,
    pub device_sample_rate: Arc<AtomicU32>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            is_playing: Arc::new(AtomicBool::new(false)),
            position_base_ms: Arc::new(AtomicU64::new(0)),
            played_frames: Arc::new(AtomicU64::new(0)),
            duration_frames: Arc::new(AtomicU64::new(0)),
            sample_rate: Arc::new(AtomicU64::new(44100)),
            device_sample_rate: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn position_ms(&self) -> u64 {
        let base = self.position_base_ms.load(Ordering::Relaxed);
        let played = self.played_frames.load(Ordering::Relaxed);
        let rate = match self.device_sample_rate.load(Ordering::Relaxed) {
            0 => self.sample_rate.load(Ordering::Relaxed),
            device => device as u64,
        };
        base + played * 1000 / rate.max(1)
    }

    pub fn duration_ms(&self) -> Option<u64> {
        let frames = self.duration_frames.load(Ordering::Relaxed);
        let rate = self.sample_rate.load(Ordering::Relaxed).max(1);
        (frames > 0).then(|| frames * 1000 / rate)
    }

    /// Restarts position accounting at `position_ms`.
    pub fn reset_position(&self, position_ms: u64) {
        self.position_base_ms.store(position_ms, Ordering::Relaxed);
        self.played_frames.store(0, Ordering::Relaxed);
    }
}
