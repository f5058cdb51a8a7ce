//! Error types for the audio sharing backend

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Playback engine errors
///
/// The `Display` text of each variant is what the requesting connection
/// receives in its `log` event.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Open failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("No audio file loaded")]
    NoTrackLoaded,

    #[error("Audio init failed: {0}")]
    Device(String),
}

/// Output device errors reported by an [`crate::audio::output::OutputBackend`]
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Output device already initialized")]
    AlreadyInitialized,

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Remote connect failed: {0}")]
    ConnectFailure(String),
}

/// Discovery errors
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("mDNS daemon unavailable: {0}")]
    Daemon(String),

    #[error("Service registration failed: {0}")]
    Register(String),

    #[error("Browse failed: {0}")]
    Browse(String),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
