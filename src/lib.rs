//! # LAN Audio Share
//!
//! Control backend for sharing audio playback across a LAN.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              HOST NODE                               │
//! │                                                                      │
//! │   Front end / remote client                                          │
//! │          │  ws://<host>:9090/ws   {type, data} envelopes             │
//! │          ▼                                                           │
//! │  ┌─────────────────────┐    ┌──────────────────────────────────┐     │
//! │  │  ui::websocket      │    │  discovery (mDNS)                │     │
//! │  │  read loop per conn │    │  _lan-bt-audio._tcp, path=/ws    │     │
//! │  └──────────┬──────────┘    └──────────────────────────────────┘     │
//! │             ▼                                                        │
//! │  ┌─────────────────────┐    ┌──────────────────────────────────┐     │
//! │  │ control::Dispatcher │───▶│ session::SessionManager          │     │
//! │  │ command → handler   │    │ role + peer connections          │     │
//! │  └──────────┬──────────┘    └──────────────────────────────────┘     │
//! │             ▼                                                        │
//! │  ┌─────────────────────────────────────────────────────────────┐     │
//! │  │ audio::AudioEngine (single lock)                            │     │
//! │  │   Track ── PlaybackStream (atomic cursor) ── output device  │     │
//! │  │   progress notifier task ──▶ events back to the requester   │     │
//! │  └─────────────────────────────────────────────────────────────┘     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod codec;
pub mod config;
pub mod control;
pub mod discovery;
pub mod error;
pub mod network;
pub mod protocol;
pub mod session;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default control port (WebSocket + HTTP API)
    pub const DEFAULT_CONTROL_PORT: u16 = 9090;

    /// Path of the duplex control endpoint
    pub const CONTROL_PATH: &str = "/ws";

    /// mDNS service type advertised by hosts
    pub const SERVICE_TYPE: &str = "_lan-bt-audio._tcp.local.";

    /// Progress notifier period in milliseconds
    pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

    /// How long a `scan_devices` browse listens for answers
    pub const DEFAULT_BROWSE_TIMEOUT_MS: u64 = 3000;

    /// Timeout for dialing a remote host
    pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

    /// Display name reported for a host reached by `connect_device`
    pub const REMOTE_HOST_NAME: &str = "Remote Host";

    /// Output buffer length requested from the device (100 ms)
    pub const OUTPUT_BUFFER_MS: u32 = 100;
}
