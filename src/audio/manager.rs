use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Sender;

use super::buffer::AudioBuffer;
use super::decoder::{decoder_thread, open_media};
use super::output::run_output;
use super::types::{DecoderCommand, EngineState, BUFFER_SIZE};
use crate::errors::AppError;
use crate::playback::{EngineEventSink, MediaEngine};

/// Local file playback through symphonia and the default cpal device.
pub struct LocalEngine {
    state: EngineState,
    buffer: Arc<AudioBuffer>,
    command_tx: Sender<DecoderCommand>,
    shutdown: Arc<AtomicBool>,
}

impl LocalEngine {
    pub fn new() -> Self {
        let state = EngineState::new();
        let buffer = Arc::new(AudioBuffer::new(BUFFER_SIZE));
        let shutdown = Arc::new(AtomicBool::new(false));
        let (command_tx, command_rx) = crossbeam_channel::unbounded();

        {
            let buffer = buffer.clone();
            let state = state.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || decoder_thread(command_rx, buffer, state, shutdown));
        }
        {
            let buffer = buffer.clone();
            let state = state.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || run_output(buffer, state, shutdown));
        }

        Self {
            state,
            buffer,
            command_tx,
            shutdown,
        }
    }

    fn send(&self, command: DecoderCommand) -> Result<(), AppError> {
        self.command_tx
            .send(command)
            .map_err(|_| AppError::Engine("Decoder thread is not running".to_string()))
    }
}

impl Default for LocalEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for LocalEngine {
    fn load(&self, path: &Path, events: EngineEventSink) -> Result<(), AppError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(AppError::Engine("Engine has been released".to_string()));
        }

        let media = open_media(path)?;
        log::info!(
            "[LocalEngine] Loaded {} ({} Hz, load #{})",
            path.display(),
            media.sample_rate,
            events.generation()
        );

        self.state.is_playing.store(false, Ordering::SeqCst);
        self.buffer.clear();
        self.state.reset_position(0);
        self.state
            .sample_rate
            .store(media.sample_rate as u64, Ordering::Relaxed);
        self.state
            .duration_frames
            .store(media.duration_frames.unwrap_or(0), Ordering::Relaxed);

        self.send(DecoderCommand::Load { media, events })
    }

    fn play(&self) -> Result<(), AppError> {
        self.state.is_playing.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn pause(&self) -> Result<(), AppError> {
        self.state.is_playing.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&self) {
        self.state.is_playing.store(false, Ordering::Relaxed);
        let _ = self.command_tx.send(DecoderCommand::Stop);
        self.buffer.clear();
    }

    fn seek(&self, position_ms: u64) -> Result<(), AppError> {
        self.send(DecoderCommand::Seek(position_ms))
    }

    fn position_ms(&self) -> u64 {
        self.state.position_ms()
    }

    fn duration_ms(&self) -> Option<u64> {
        self.state.duration_ms()
    }

    fn release(&self) {
        log::info!("[LocalEngine] Releasing");
        self.stop();
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
