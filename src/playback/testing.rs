//! Scriptable engine for session tests.

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::engine::{EngineEvent, EngineEventSink, MediaEngine};
use crate::errors::AppError;

pub struct FakeEngine {
    sinks: Mutex<Vec<EngineEventSink>>,
    calls: Mutex<Vec<String>>,
    position_ms: AtomicU64,
    duration_ms: Mutex<Option<u64>>,
    /// Emit `Started` as soon as `play` is called on a fresh load.
    auto_start: AtomicBool,
    fail_load: AtomicBool,
    started: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            position_ms: AtomicU64::new(0),
            duration_ms: Mutex::new(None),
            auto_start: AtomicBool::new(true),
            fail_load: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    pub fn set_auto_start(&self, enabled: bool) {
        self.auto_start.store(enabled, Ordering::SeqCst);
    }

    pub fn set_fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn set_position_ms(&self, position: u64) {
        self.position_ms.store(position, Ordering::SeqCst);
    }

    pub fn set_duration_ms(&self, duration: Option<u64>) {
        *self.duration_ms.lock() = duration;
    }

    /// Emits through the most recent load's sink.
    pub fn emit(&self, event: EngineEvent) {
        if let Some(sink) = self.sinks.lock().last() {
            sink.emit(event);
        }
    }

    /// Emits through the sink of the `index`-th load.
    pub fn emit_for_load(&self, index: usize, event: EngineEvent) {
        if let Some(sink) = self.sinks.lock().get(index) {
            sink.emit(event);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

impl MediaEngine for FakeEngine {
    fn load(&self, path: &Path, events: EngineEventSink) -> Result<(), AppError> {
        self.record(format!("load:{}", path.display()));
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(AppError::Engine("unsupported codec".to_string()));
        }
        self.sinks.lock().push(events);
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn play(&self) -> Result<(), AppError> {
        self.record("play");
        if self.auto_start.load(Ordering::SeqCst) && !self.started.swap(true, Ordering::SeqCst) {
            self.emit(EngineEvent::Started);
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), AppError> {
        self.record("pause");
        Ok(())
    }

    fn stop(&self) {
        self.record("stop");
    }

    fn seek(&self, position_ms: u64) -> Result<(), AppError> {
        self.record(format!("seek:{}", position_ms));
        self.position_ms.store(position_ms, Ordering::SeqCst);
        Ok(())
    }

    fn position_ms(&self) -> u64 {
        self.position_ms.load(Ordering::SeqCst)
    }

    fn duration_ms(&self) -> Option<u64> {
        *self.duration_ms.lock()
    }

    fn release(&self) {
        self.record("release");
    }
}
