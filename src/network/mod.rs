//! Network plumbing for the control protocol

pub mod addr;
pub mod listener;
pub mod peer;

pub use addr::{local_ipv4, normalize_peer_address};
pub use listener::bind_control_listener;
pub use peer::{connect, PeerLink};
