//! Single-item playback with resumable position tracking.
//!
//! One `PlaybackSession` owns one media engine. All state changes go
//! through an async mutex over [`Core`], so a position sync can never
//! interleave with the write a stop or switch performs. Engine events
//! arrive on a channel and are applied by a dispatcher task, which also
//! drives the periodic position sync.

use parking_lot::RwLock;
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{EngineEvent, EngineEventSink, MediaEngine};
use super::progress::StartMode;
use crate::config::AppConfig;
use crate::database::now_secs;
use crate::error_log::ErrorLogManager;
use crate::errors::AppError;
use crate::history::PlayHistoryManager;
use crate::playlist::{PlaylistItem, PlaylistManager};
use crate::settings::SettingsManager;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
    /// Stopped by the user; the offset was saved.
    Stopped,
    /// Played through to the end.
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    Loading {
        item_id: String,
        fullscreen: bool,
    },
    Started {
        item_id: String,
        resumed_from_secs: Option<i64>,
    },
    DurationCaptured {
        item_id: String,
        duration_ms: i64,
    },
    PositionSaved {
        item_id: String,
        position_secs: i64,
    },
    Paused {
        item_id: String,
    },
    Resumed {
        item_id: String,
    },
    Stopped {
        item_id: String,
        /// `None` when playback never began and the stored offset was kept.
        position_secs: Option<i64>,
    },
    Ended {
        item_id: String,
        position_secs: Option<i64>,
    },
    Error {
        item_id: Option<String>,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub position_sync_interval: Duration,
    pub duration_probe_attempts: u32,
    pub duration_probe_step: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SessionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            position_sync_interval: config.position_sync_interval(),
            duration_probe_attempts: config.duration_probe_attempts,
            duration_probe_step: config.duration_probe_step(),
        }
    }
}

/// What the UI can read without waiting on the session lock.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    state: PlaybackState,
    item_id: Option<String>,
}

struct Current {
    item: PlaylistItem,
    mode: StartMode,
    generation: u64,
    started_at: Option<i64>,
    last_saved_secs: Option<i64>,
    /// Set once the item is removed from its playlist mid-playback; its
    /// offset is no longer written.
    removed: bool,
}

#[derive(Default)]
struct Core {
    state: PlaybackState,
    current: Option<Current>,
    generation: u64,
    closed: bool,
}

struct SessionInner {
    engine: Arc<dyn MediaEngine>,
    playlists: Arc<PlaylistManager>,
    history: PlayHistoryManager,
    error_log: ErrorLogManager,
    settings: SettingsManager,
    config: SessionConfig,

    core: Mutex<Core>,
    snapshot: RwLock<Snapshot>,

    /// Last position reported by the engine, in milliseconds.
    last_position_ms: AtomicU64,

    events: broadcast::Sender<SessionEvent>,
    engine_tx: mpsc::UnboundedSender<(u64, EngineEvent)>,

    /// Bumped whenever the current media goes away; background work tied
    /// to an older value stops.
    generation_tx: watch::Sender<u64>,
    shutdown_tx: watch::Sender<bool>,
    released: AtomicBool,
}

pub struct PlaybackSession {
    inner: Arc<SessionInner>,
    dispatcher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackSession {
    /// Must be called from within a tokio runtime; the event dispatcher is
    /// spawned immediately.
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        playlists: Arc<PlaylistManager>,
        pool: Pool<Sqlite>,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(128);
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (generation_tx, _) = watch::channel(0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(SessionInner {
            engine,
            playlists,
            history: PlayHistoryManager::new(pool.clone()),
            error_log: ErrorLogManager::new(pool.clone()),
            settings: SettingsManager::new(pool),
            config,
            core: Mutex::new(Core::default()),
            snapshot: RwLock::new(Snapshot::default()),
            last_position_ms: AtomicU64::new(0),
            events,
            engine_tx,
            generation_tx,
            shutdown_tx,
            released: AtomicBool::new(false),
        });

        let dispatcher = tokio::spawn(run_dispatcher(inner.clone(), engine_rx, shutdown_rx));
        log::info!("[PlaybackSession] Session started");

        Self {
            inner,
            dispatcher: parking_lot::Mutex::new(Some(dispatcher)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.snapshot.read().state
    }

    /// The item being loaded, played or paused.
    pub fn current_item_id(&self) -> Option<String> {
        self.inner.snapshot.read().item_id.clone()
    }

    pub fn last_position_ms(&self) -> u64 {
        self.inner.last_position_ms.load(Ordering::Relaxed)
    }

    /// Starts playing `item_id`, stopping whatever was current first.
    pub async fn play(&self, item_id: &str, mode: StartMode) -> Result<(), AppError> {
        self.inner.play(item_id, mode).await
    }

    /// Plays an item the way a double-click would: finished items and
    /// items never played start over, everything else continues.
    pub async fn play_default(&self, item_id: &str) -> Result<StartMode, AppError> {
        let item = self.inner.playlists.get_item(item_id).await?;
        let mode = item.default_start_mode();
        self.inner.play(item_id, mode).await?;
        Ok(mode)
    }

    pub async fn pause(&self) -> Result<bool, AppError> {
        self.inner.pause().await
    }

    pub async fn resume(&self) -> Result<bool, AppError> {
        self.inner.resume().await
    }

    pub async fn stop(&self) -> Result<bool, AppError> {
        let mut core = self.inner.core.lock().await;
        if core.closed {
            return Err(AppError::SessionClosed);
        }
        Ok(self.inner.stop_current(&mut core).await)
    }

    /// Stops playback, releases the engine and ends the dispatcher. Safe
    /// to call more than once.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.inner.shutdown().await;
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("[PlaybackSession] Dispatcher ended abnormally: {}", e);
            }
        }
        Ok(())
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if *self.inner.shutdown_tx.borrow() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = self.inner.clone();
                handle.spawn(async move {
                    inner.shutdown().await;
                });
            }
            Err(_) => {
                // No runtime left to persist anything; just free the engine.
                self.inner.release_engine();
                self.inner.shutdown_tx.send_replace(true);
            }
        }
    }
}

async fn run_dispatcher(
    inner: Arc<SessionInner>,
    mut engine_rx: mpsc::UnboundedReceiver<(u64, EngineEvent)>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(inner.config.position_sync_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            received = engine_rx.recv() => match received {
                Some((generation, event)) => inner.handle_engine_event(generation, event).await,
                None => break,
            },
            _ = ticker.tick() => inner.sync_position().await,
            _ = shutdown_rx.changed() => break,
        }
    }

    log::info!("[PlaybackSession] Dispatcher stopped");
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn set_state(&self, core: &mut Core, state: PlaybackState) {
        core.state = state;
        let item_id = match state {
            PlaybackState::Loading | PlaybackState::Playing | PlaybackState::Paused => {
                core.current.as_ref().map(|c| c.item.id.clone())
            }
            _ => None,
        };
        *self.snapshot.write() = Snapshot { state, item_id };
    }

    fn advance_generation(&self, core: &mut Core) -> u64 {
        core.generation += 1;
        self.generation_tx.send_replace(core.generation);
        core.generation
    }

    fn release_engine(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.engine.release();
            log::info!("[PlaybackSession] Engine released");
        }
    }

    /// Logs and records a failure. Never fails itself.
    async fn record_error(&self, item: Option<&PlaylistItem>, message: &str, detail: &str) {
        log::error!("[PlaybackSession] {}: {}", message, detail);

        let playlist_id = item.map(|i| i.playlist_id.as_str());
        let item_id = item.map(|i| i.id.as_str());
        if let Err(e) = self.error_log.record(playlist_id, item_id, message, detail).await {
            log::error!("[PlaybackSession] Could not write error log entry: {}", e);
        }
    }

    async fn play(self: &Arc<Self>, item_id: &str, mode: StartMode) -> Result<(), AppError> {
        let mut core = self.core.lock().await;
        if core.closed {
            return Err(AppError::SessionClosed);
        }

        let item = self.playlists.get_item(item_id).await?;

        if !Path::new(&item.path).exists() {
            let err = AppError::FileNotFound(item.path.clone());
            self.record_error(Some(&item), "Media file not found", &item.path)
                .await;
            self.emit(SessionEvent::Error {
                item_id: Some(item.id.clone()),
                message: err.to_string(),
            });
            return Err(err);
        }

        let fullscreen = match self.settings.fullscreen_behavior().await {
            Ok(behavior) => behavior.enters_fullscreen(),
            Err(e) => {
                log::warn!("[PlaybackSession] Could not read fullscreen setting: {}", e);
                true
            }
        };

        self.stop_current(&mut core).await;

        let generation = self.advance_generation(&mut core);
        self.last_position_ms.store(0, Ordering::Relaxed);

        log::info!(
            "[PlaybackSession] Loading '{}' ({:?}, generation {})",
            item.name,
            mode,
            generation
        );

        let sink = EngineEventSink::new(generation, self.engine_tx.clone());
        if let Err(e) = self.engine.load(Path::new(&item.path), sink) {
            return Err(self.fail_load(&mut core, &item, e).await);
        }

        let loaded_id = item.id.clone();
        core.current = Some(Current {
            last_saved_secs: item.position_secs,
            removed: false,
            item,
            mode,
            generation,
            started_at: None,
        });
        self.set_state(&mut core, PlaybackState::Loading);
        self.emit(SessionEvent::Loading {
            item_id: loaded_id,
            fullscreen,
        });

        if let Err(e) = self.engine.play() {
            let Some(current) = core.current.take() else {
                return Err(e);
            };
            self.engine.stop();
            return Err(self.fail_load(&mut core, &current.item, e).await);
        }

        Ok(())
    }

    async fn fail_load(&self, core: &mut Core, item: &PlaylistItem, error: AppError) -> AppError {
        let message = match error {
            AppError::Engine(message) => message,
            other => other.to_string(),
        };

        self.record_error(Some(item), "Could not start playback", &message)
            .await;
        self.advance_generation(core);
        core.current = None;
        self.set_state(core, PlaybackState::Idle);
        self.emit(SessionEvent::Error {
            item_id: Some(item.id.clone()),
            message: message.clone(),
        });

        AppError::Engine(message)
    }

    async fn pause(&self) -> Result<bool, AppError> {
        let mut core = self.core.lock().await;
        if core.closed {
            return Err(AppError::SessionClosed);
        }
        if core.state != PlaybackState::Playing {
            return Ok(false);
        }
        let Some(item_id) = core.current.as_ref().map(|c| c.item.id.clone()) else {
            return Ok(false);
        };

        self.engine.pause()?;
        self.set_state(&mut core, PlaybackState::Paused);
        self.emit(SessionEvent::Paused { item_id });
        Ok(true)
    }

    async fn resume(&self) -> Result<bool, AppError> {
        let mut core = self.core.lock().await;
        if core.closed {
            return Err(AppError::SessionClosed);
        }
        if core.state != PlaybackState::Paused {
            return Ok(false);
        }
        let Some(item_id) = core.current.as_ref().map(|c| c.item.id.clone()) else {
            return Ok(false);
        };

        self.engine.play()?;
        self.set_state(&mut core, PlaybackState::Playing);
        self.emit(SessionEvent::Resumed { item_id });
        Ok(true)
    }

    /// Stops the current item, if any. Returns whether anything was
    /// stopped.
    async fn stop_current(&self, core: &mut Core) -> bool {
        let position_secs = match core.state {
            PlaybackState::Playing | PlaybackState::Paused => {
                Some((self.engine.position_ms() / 1000) as i64)
            }
            // Playback never began; keep the stored offset.
            PlaybackState::Loading => None,
            _ => return false,
        };

        let Some(current) = core.current.take() else {
            return false;
        };

        if let Some(secs) = position_secs.filter(|_| !current.removed) {
            match self
                .playlists
                .update_item_position(&current.item.id, Some(secs))
                .await
            {
                Ok(()) => {}
                Err(AppError::NotFound(_)) => {
                    log::info!(
                        "[PlaybackSession] '{}' was removed, not saving its position",
                        current.item.name
                    );
                }
                Err(e) => {
                    self.record_error(Some(&current.item), "Could not save position", &e.to_string())
                        .await;
                }
            }
        }

        self.engine.stop();
        self.advance_generation(core);
        self.set_state(core, PlaybackState::Stopped);

        log::info!(
            "[PlaybackSession] Stopped '{}' at {:?}s",
            current.item.name,
            position_secs
        );
        self.emit(SessionEvent::Stopped {
            item_id: current.item.id,
            position_secs,
        });
        true
    }

    async fn shutdown(&self) {
        let mut core = self.core.lock().await;
        if core.closed {
            return;
        }

        self.stop_current(&mut core).await;
        self.advance_generation(&mut core);
        core.closed = true;
        self.set_state(&mut core, PlaybackState::Idle);

        self.release_engine();
        self.shutdown_tx.send_replace(true);
        log::info!("[PlaybackSession] Session shut down");
    }

    async fn handle_engine_event(self: &Arc<Self>, generation: u64, event: EngineEvent) {
        let mut core = self.core.lock().await;

        let is_current = !core.closed
            && core.generation == generation
            && core
                .current
                .as_ref()
                .map(|c| c.generation == generation)
                .unwrap_or(false);
        if !is_current {
            log::debug!(
                "[PlaybackSession] Ignoring {:?} from stale generation {}",
                event,
                generation
            );
            return;
        }

        match event {
            EngineEvent::Started => self.on_started(&mut core).await,
            EngineEvent::EndReached => self.on_end_reached(&mut core).await,
            EngineEvent::Error(message) => self.on_engine_error(&mut core, message).await,
            EngineEvent::PositionChanged(position_ms) => {
                self.last_position_ms.store(position_ms, Ordering::Relaxed);
            }
        }
    }

    async fn on_started(self: &Arc<Self>, core: &mut Core) {
        if core.state != PlaybackState::Loading {
            return;
        }
        let started_at = now_secs();

        let Some(current) = core.current.as_mut() else {
            return;
        };
        current.started_at = Some(started_at);
        let item = current.item.clone();
        let mode = current.mode;
        let generation = current.generation;

        self.set_state(core, PlaybackState::Playing);

        if let Err(e) = self
            .history
            .record_play(&item.playlist_id, &item.id, started_at)
            .await
        {
            self.record_error(Some(&item), "Could not record play", &e.to_string())
                .await;
        }

        let resume_from = match mode {
            StartMode::Continue => item.position_secs.filter(|secs| *secs > 0),
            StartMode::FromStart => None,
        };
        if let Some(offset) = resume_from {
            let position_ms = offset as u64 * 1000;
            match self.engine.seek(position_ms) {
                Ok(()) => self.last_position_ms.store(position_ms, Ordering::Relaxed),
                Err(e) => {
                    self.record_error(Some(&item), "Could not seek to stored position", &e.to_string())
                        .await
                }
            }
        }

        log::info!("[PlaybackSession] Playing '{}' from {:?}s", item.name, resume_from);
        self.emit(SessionEvent::Started {
            item_id: item.id.clone(),
            resumed_from_secs: resume_from,
        });

        if item.duration_ms.map(|d| d <= 0).unwrap_or(true) {
            self.spawn_duration_probe(generation, item.id);
        }
    }

    async fn on_end_reached(&self, core: &mut Core) {
        if !matches!(core.state, PlaybackState::Playing | PlaybackState::Paused) {
            return;
        }
        let Some(current) = core.current.take() else {
            return;
        };
        let item = &current.item;

        let duration_ms = match item.duration_ms.filter(|d| *d > 0) {
            Some(duration) => Some(duration),
            None => {
                let reported = self
                    .engine
                    .duration_ms()
                    .and_then(|d| i64::try_from(d).ok())
                    .filter(|d| *d > 0);
                if let Some(duration) = reported {
                    if let Err(e) = self.playlists.set_item_duration(&item.id, duration).await {
                        self.record_error(Some(item), "Could not save duration", &e.to_string())
                            .await;
                    }
                }
                reported
            }
        };

        // Rounded to the nearest second so the item reads as 100%.
        let final_position = duration_ms.map(|d| (d + 500) / 1000);
        let started_at = current.started_at.unwrap_or_else(now_secs);

        if let Err(e) = self
            .history
            .record_completion(&item.playlist_id, &item.id, started_at, final_position)
            .await
        {
            self.record_error(Some(item), "Could not record completion", &e.to_string())
                .await;
        }

        self.advance_generation(core);
        self.set_state(core, PlaybackState::Ended);

        log::info!("[PlaybackSession] Finished '{}'", item.name);
        self.emit(SessionEvent::Ended {
            item_id: item.id.clone(),
            position_secs: final_position,
        });
    }

    async fn on_engine_error(&self, core: &mut Core, message: String) {
        let Some(current) = core.current.take() else {
            return;
        };

        self.record_error(Some(&current.item), "Playback failed", &message)
            .await;

        self.engine.stop();
        self.advance_generation(core);
        self.set_state(core, PlaybackState::Idle);
        self.emit(SessionEvent::Error {
            item_id: Some(current.item.id),
            message,
        });
    }

    /// Writes the engine offset while playing, skipping writes that would
    /// not change anything. Failures are retried on the next tick.
    async fn sync_position(&self) {
        let mut core = self.core.lock().await;
        if core.state != PlaybackState::Playing {
            return;
        }
        let Some(current) = core.current.as_mut() else {
            return;
        };

        let position_ms = self.engine.position_ms();
        self.last_position_ms.store(position_ms, Ordering::Relaxed);
        if current.removed {
            return;
        }

        let secs = (position_ms / 1000) as i64;
        if current.last_saved_secs == Some(secs) {
            return;
        }

        match self
            .playlists
            .update_item_position(&current.item.id, Some(secs))
            .await
        {
            Ok(()) => {
                current.last_saved_secs = Some(secs);
                self.emit(SessionEvent::PositionSaved {
                    item_id: current.item.id.clone(),
                    position_secs: secs,
                });
            }
            Err(AppError::NotFound(_)) => {
                log::info!(
                    "[PlaybackSession] '{}' was removed from its playlist, position sync off",
                    current.item.name
                );
                current.removed = true;
            }
            Err(e) => log::warn!("[PlaybackSession] Position sync failed, will retry: {}", e),
        }
    }

    fn spawn_duration_probe(self: &Arc<Self>, generation: u64, item_id: String) {
        let inner = Arc::clone(self);
        let mut generation_rx = self.generation_tx.subscribe();

        tokio::spawn(async move {
            let attempts = inner.config.duration_probe_attempts;

            for attempt in 0..attempts {
                let delay = inner.config.duration_probe_step * (attempt + 1);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = generation_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }

                if *generation_rx.borrow() != generation {
                    log::debug!("[PlaybackSession] Duration probe for {} cancelled", item_id);
                    return;
                }

                let reported = inner
                    .engine
                    .duration_ms()
                    .and_then(|d| i64::try_from(d).ok())
                    .filter(|d| *d > 0);
                if let Some(duration_ms) = reported {
                    inner.store_duration(generation, &item_id, duration_ms).await;
                    return;
                }
            }

            log::warn!(
                "[PlaybackSession] No duration for {} after {} attempts",
                item_id,
                attempts
            );
        });
    }

    async fn store_duration(&self, generation: u64, item_id: &str, duration_ms: i64) {
        let mut core = self.core.lock().await;
        if core.generation != generation {
            return;
        }
        let Some(current) = core.current.as_mut() else {
            return;
        };

        match self.playlists.set_item_duration(item_id, duration_ms).await {
            Ok(()) => {
                current.item.duration_ms = Some(duration_ms);
                log::info!("[PlaybackSession] Captured duration {}ms for {}", duration_ms, item_id);
                self.emit(SessionEvent::DurationCaptured {
                    item_id: item_id.to_string(),
                    duration_ms,
                });
            }
            Err(e) => {
                let item = current.item.clone();
                self.record_error(Some(&item), "Could not save duration", &e.to_string())
                    .await;
            }
        }
    }
}
