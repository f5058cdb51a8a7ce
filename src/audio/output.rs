//! Output device backends
//!
//! The engine talks to the device through [`OutputBackend`]. Initialization
//! is idempotent by contract: a backend that is already running answers
//! [`OutputError::AlreadyInitialized`], which callers treat as success.

use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::device::get_default_output_device;
use crate::audio::PlaybackStream;
use crate::constants::OUTPUT_BUFFER_MS;
use crate::error::OutputError;

/// Sink for rendered audio
pub trait OutputBackend: Send + Sync {
    /// Open the device for the given track format.
    fn init(&self, sample_rate: u32, channels: u16) -> Result<(), OutputError>;

    /// Route a stream to the device, replacing the current one.
    fn attach(&self, stream: Arc<PlaybackStream>);

    /// Stop rendering; the device outputs silence.
    fn detach(&self);
}

type CurrentStream = Arc<Mutex<Option<Arc<PlaybackStream>>>>;

/// cpal-backed output on the default device.
///
/// The cpal stream is not `Send`, so it lives on a dedicated thread that
/// keeps it alive until the backend is dropped. The device callback pulls
/// from whichever [`PlaybackStream`] is attached.
pub struct CpalOutput {
    current: CurrentStream,
    running: Arc<AtomicBool>,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
}

impl CpalOutput {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Default for CpalOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for CpalOutput {
    fn init(&self, sample_rate: u32, channels: u16) -> Result<(), OutputError> {
        let mut thread_handle = self.thread_handle.lock();
        if self.is_running() {
            return Err(OutputError::AlreadyInitialized);
        }

        let device = get_default_output_device()?;
        let mut config = device.stream_config_for(sample_rate, channels)?;
        config.buffer_size =
            cpal::BufferSize::Fixed(config.sample_rate.0 * OUTPUT_BUFFER_MS / 1000);
        tracing::info!(
            "Opening output device {}: {}Hz, {} channels",
            device.name,
            config.sample_rate.0,
            config.channels
        );

        let (ready_tx, ready_rx) = bounded::<Result<(), OutputError>>(1);
        let running = self.running.clone();
        let current = self.current.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let out_channels = config.channels;
                let build = |config: &cpal::StreamConfig| {
                    let current = current.clone();
                    device.inner().build_output_stream(
                        config,
                        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                            // Never block the device thread
                            match current.try_lock().as_deref() {
                                Some(Some(stream)) => {
                                    stream.render(data, out_channels);
                                }
                                _ => data.fill(0.0),
                            }
                        },
                        |err| tracing::error!("Output stream error: {}", err),
                        None,
                    )
                };

                // Some backends reject fixed buffer sizes
                let stream = build(&config).or_else(|_| {
                    let mut fallback = config.clone();
                    fallback.buffer_size = cpal::BufferSize::Default;
                    build(&fallback)
                });

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        running.store(false, Ordering::SeqCst);
                        let _ = ready_tx.send(Err(OutputError::StreamError(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    running.store(false, Ordering::SeqCst);
                    let _ = ready_tx.send(Err(OutputError::StreamError(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                OutputError::StreamError(e.to_string())
            })?;

        let result = ready_rx
            .recv_timeout(Duration::from_secs(2))
            .unwrap_or_else(|_| {
                Err(OutputError::StreamError("Output thread did not start".into()))
            });

        if result.is_ok() {
            *thread_handle = Some(handle);
        } else {
            self.running.store(false, Ordering::SeqCst);
            let _ = handle.join();
        }
        result
    }

    fn attach(&self, stream: Arc<PlaybackStream>) {
        *self.current.lock() = Some(stream);
    }

    fn detach(&self) {
        *self.current.lock() = None;
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
    }
}
