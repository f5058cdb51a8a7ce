//! Playback stream shared between the engine and the output device
//!
//! The device callback is the only writer of the cursor; the engine and the
//! progress notifier only read it. Everything here is atomic so the
//! real-time thread never takes a lock.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::audio::Track;

/// One playback attempt over a loaded [`Track`]
pub struct PlaybackStream {
    track: Arc<Track>,
    /// Frames rendered so far
    position: AtomicU64,
    paused: AtomicBool,
    /// f32 bits of the linear amplitude
    amplitude: AtomicU32,
    finished: AtomicBool,
    done: Notify,
}

impl PlaybackStream {
    /// Create a stream at cursor 0. Streams start paused.
    pub fn new(track: Arc<Track>, amplitude: f32) -> Self {
        Self {
            track,
            position: AtomicU64::new(0),
            paused: AtomicBool::new(true),
            amplitude: AtomicU32::new(amplitude.to_bits()),
            finished: AtomicBool::new(false),
            done: Notify::new(),
        }
    }

    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    /// Frames played, never past the end of the track
    pub fn position(&self) -> u64 {
        self.position
            .load(Ordering::Acquire)
            .min(self.track.total_samples())
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    pub fn amplitude(&self) -> f32 {
        f32::from_bits(self.amplitude.load(Ordering::Relaxed))
    }

    pub fn set_amplitude(&self, amplitude: f32) {
        self.amplitude.store(amplitude.to_bits(), Ordering::Relaxed);
    }

    /// True once the last frame has been rendered
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Resolves when the stream reaches the end of the track
    pub async fn wait_finished(&self) {
        loop {
            let notified = self.done.notified();
            if self.is_finished() {
                return;
            }
            notified.await;
        }
    }

    /// Render into an interleaved device buffer with `out_channels` channels.
    ///
    /// Writes silence while paused or after the end. Mono tracks are copied
    /// to every output channel; extra track channels are dropped. Returns
    /// the number of track frames consumed.
    pub fn render(&self, out: &mut [f32], out_channels: u16) -> usize {
        let out_channels = out_channels.max(1) as usize;
        if self.is_paused() || self.is_finished() {
            out.fill(0.0);
            return 0;
        }

        let amplitude = self.amplitude();
        let start = self.position.load(Ordering::Acquire);
        let mut cursor = start;

        for out_frame in out.chunks_mut(out_channels) {
            match self.track.frame(cursor) {
                Some(frame) => {
                    let last = frame.len() - 1;
                    for (ch, sample) in out_frame.iter_mut().enumerate() {
                        *sample = frame[ch.min(last)] * amplitude;
                    }
                    cursor += 1;
                }
                None => out_frame.fill(0.0),
            }
        }

        self.position.store(cursor, Ordering::Release);

        if cursor >= self.track.total_samples() && !self.finished.swap(true, Ordering::AcqRel) {
            self.done.notify_one();
        }

        (cursor - start) as usize
    }
}

impl std::fmt::Debug for PlaybackStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackStream")
            .field("source", &self.track.source())
            .field("position", &self.position())
            .field("total", &self.track.total_samples())
            .field("paused", &self.is_paused())
            .finish()
    }
}
