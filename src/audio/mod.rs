//! Audio subsystem: track buffer, playback engine and output device

pub mod device;
pub mod engine;
pub mod output;
pub mod stream;
pub mod track;
pub mod volume;

pub use device::{get_default_output_device, list_output_devices, AudioDevice, OutputDeviceInfo};
pub use engine::{AudioEngine, PlaybackSnapshot, PlaybackState};
pub use output::{CpalOutput, OutputBackend};
pub use stream::PlaybackStream;
pub use track::Track;
