//! Playback engine
//!
//! Owns the loaded [`Track`], the current [`PlaybackStream`] and the volume.
//! Every operation runs under one exclusive lock, which serializes commands
//! arriving from different connections. Events are emitted on the
//! [`EventSink`] of the connection that issued the command.
//!
//! While playing, a progress notifier task reports the cursor every
//! interval. It is owned by the current playback attempt: each `play`
//! cancels the previous notifier before spawning a new one, and the
//! notifier re-checks its cancellation token under the engine lock before
//! emitting, so nothing is reported after `pause`/`stop` returns.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::audio::volume::{clamp_level, gain_to_amplitude, level_to_gain};
use crate::audio::{OutputBackend, PlaybackStream, Track};
use crate::codec::{decode_file, format::file_name};
use crate::config::PlaybackConfig;
use crate::error::{AudioError, OutputError};
use crate::protocol::{Event, EventSink};

/// Engine state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loaded,
    Playing,
    Paused,
    Stopped,
}

/// Point-in-time view of the engine for the status API
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub filename: Option<String>,
    pub position: u64,
    pub total: u64,
    pub level: f64,
}

struct ProgressNotifier {
    token: CancellationToken,
    _handle: JoinHandle<()>,
}

struct EngineInner {
    track: Option<Arc<Track>>,
    stream: Option<Arc<PlaybackStream>>,
    state: PlaybackState,
    level: f64,
    gain: f64,
    notifier: Option<ProgressNotifier>,
    device_ready: bool,
    /// Ticket handed to the most recently started load
    next_load: u64,
    /// Ticket of the load that installed the current track
    installed_load: u64,
}

impl EngineInner {
    fn cancel_notifier(&mut self) {
        if let Some(notifier) = self.notifier.take() {
            notifier.token.cancel();
        }
    }
}

/// Cheaply cloneable handle to the process's playback engine
#[derive(Clone)]
pub struct AudioEngine {
    inner: Arc<Mutex<EngineInner>>,
    output: Arc<dyn OutputBackend>,
    progress_interval: Duration,
}

impl AudioEngine {
    pub fn new(output: Arc<dyn OutputBackend>, config: &PlaybackConfig) -> Self {
        let level = clamp_level(config.initial_volume);
        Self {
            inner: Arc::new(Mutex::new(EngineInner {
                track: None,
                stream: None,
                state: PlaybackState::Idle,
                level,
                gain: level_to_gain(level),
                notifier: None,
                device_ready: false,
                next_load: 0,
                installed_load: 0,
            })),
            output,
            progress_interval: config.progress_interval(),
        }
    }

    /// Decode `path` and install it as the current track.
    ///
    /// A ticket is taken under the lock before decoding, which happens
    /// without the lock. Installs follow ticket order: a load that finishes
    /// after a later-started load was installed is dropped. On any failure
    /// the previous track and state are left untouched.
    pub fn load(&self, path: &str, sink: &EventSink) -> Result<(), AudioError> {
        let ticket = self.reserve_load();
        let track = Arc::new(decode_file(path)?);
        self.install(ticket, track, path, sink);
        Ok(())
    }

    fn reserve_load(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.next_load += 1;
        inner.next_load
    }

    /// Returns false when a later-started load is already installed
    fn install(&self, ticket: u64, track: Arc<Track>, path: &str, sink: &EventSink) -> bool {
        let duration = track.duration_secs();

        let mut inner = self.inner.lock();
        if ticket < inner.installed_load {
            debug!("Dropping load of {}, superseded by a later load", file_name(path));
            return false;
        }
        inner.cancel_notifier();
        if let Some(old) = inner.stream.take() {
            old.set_paused(true);
            self.output.detach();
        }
        inner.track = Some(track);
        inner.installed_load = ticket;
        inner.state = PlaybackState::Loaded;

        info!("Loaded {} ({:.2}s)", file_name(path), duration);
        sink.emit(Event::FileLoaded {
            filename: path.to_string(),
            duration,
        });
        true
    }

    /// Start or resume playback.
    ///
    /// A fresh start (nothing played yet, or the previous stream ran to the
    /// end) begins at sample 0; otherwise playback resumes at the cursor.
    pub fn play(&self, sink: &EventSink) -> Result<(), AudioError> {
        let mut inner = self.inner.lock();
        let track = inner.track.clone().ok_or(AudioError::NoTrackLoaded)?;

        inner.cancel_notifier();
        self.ensure_output(&mut inner, &track)?;

        let (stream, fresh) = match inner.stream.clone() {
            Some(stream) if !stream.is_finished() => (stream, false),
            _ => {
                let stream = Arc::new(PlaybackStream::new(track, gain_to_amplitude(inner.gain)));
                inner.stream = Some(stream.clone());
                (stream, true)
            }
        };
        self.output.attach(stream.clone());
        stream.set_paused(false);
        inner.state = PlaybackState::Playing;

        let position = if fresh { 0.0 } else { stream.position() as f64 };
        debug!("Playback {} at sample {}", if fresh { "started" } else { "resumed" }, position);
        sink.emit(Event::PlaybackStarted { position });

        inner.notifier = Some(self.spawn_notifier(stream, sink.clone()));
        Ok(())
    }

    /// Pause without touching the cursor. Idempotent.
    pub fn pause(&self, sink: &EventSink) {
        let mut inner = self.inner.lock();
        inner.cancel_notifier();
        if let Some(stream) = &inner.stream {
            stream.set_paused(true);
        }
        if inner.state == PlaybackState::Playing {
            inner.state = PlaybackState::Paused;
        }
        sink.emit(Event::PlaybackPaused {});
    }

    /// Halt playback. The cursor stays where it is, so a later `play`
    /// resumes mid-track. Idempotent.
    pub fn stop(&self, sink: &EventSink) {
        let mut inner = self.inner.lock();
        inner.cancel_notifier();
        if let Some(stream) = &inner.stream {
            stream.set_paused(true);
        }
        if matches!(inner.state, PlaybackState::Playing | PlaybackState::Paused) {
            inner.state = PlaybackState::Stopped;
        }
        sink.emit(Event::PlaybackStopped {});
    }

    /// Set the 0..100 volume level; applies to the live stream immediately
    /// and to every later stream.
    pub fn set_volume(&self, level: f64, sink: &EventSink) {
        let level = clamp_level(level);
        let gain = level_to_gain(level);

        let mut inner = self.inner.lock();
        inner.level = level;
        inner.gain = gain;
        if let Some(stream) = &inner.stream {
            stream.set_amplitude(gain_to_amplitude(gain));
        }
        debug!("Volume {} (gain {})", level, gain);
        sink.emit(Event::VolumeChanged { level });
    }

    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    #[cfg(test)]
    pub(crate) fn gain(&self) -> f64 {
        self.inner.lock().gain
    }

    #[cfg(test)]
    pub(crate) fn position(&self) -> u64 {
        self.inner
            .lock()
            .stream
            .as_ref()
            .map(|s| s.position())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let inner = self.inner.lock();
        PlaybackSnapshot {
            state: inner.state,
            filename: inner.track.as_ref().map(|t| t.source().to_string()),
            position: inner.stream.as_ref().map(|s| s.position()).unwrap_or(0),
            total: inner.track.as_ref().map(|t| t.total_samples()).unwrap_or(0),
            level: inner.level,
        }
    }

    /// Lazily open the output device.
    ///
    /// "Already initialized" is success. Once the device has come up, a
    /// later init failure is ignored and the existing configuration stays
    /// in use; only a failure of the very first init is an error.
    fn ensure_output(&self, inner: &mut EngineInner, track: &Track) -> Result<(), AudioError> {
        match self.output.init(track.sample_rate(), track.channels()) {
            Ok(()) | Err(OutputError::AlreadyInitialized) => {
                inner.device_ready = true;
                Ok(())
            }
            Err(e) if inner.device_ready => {
                debug!("Output re-init failed, keeping current device: {}", e);
                Ok(())
            }
            Err(e) => Err(AudioError::Device(e.to_string())),
        }
    }

    fn spawn_notifier(&self, stream: Arc<PlaybackStream>, sink: EventSink) -> ProgressNotifier {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let engine: Weak<Mutex<EngineInner>> = Arc::downgrade(&self.inner);
        let period = self.progress_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let total = stream.track().total_samples() as f64;

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => return,
                    _ = stream.wait_finished() => {
                        let Some(engine) = engine.upgrade() else { return };
                        let mut inner = engine.lock();
                        if cancelled.is_cancelled() {
                            return;
                        }
                        // Still the current notifier, so this attempt owns the state
                        inner.notifier = None;
                        inner.state = PlaybackState::Stopped;
                        debug!("Playback reached end of track");
                        sink.emit(Event::PlaybackStopped {});
                        return;
                    }
                    _ = ticker.tick() => {
                        let Some(engine) = engine.upgrade() else { return };
                        let _guard = engine.lock();
                        if cancelled.is_cancelled() {
                            return;
                        }
                        sink.emit(Event::ProgressUpdate {
                            position: stream.position() as f64,
                            total,
                        });
                    }
                }
            }
        });

        ProgressNotifier {
            token,
            _handle: handle,
        }
    }
}
