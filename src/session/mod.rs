//! Node role and peer connections

pub mod manager;
pub mod peer;

pub use manager::{Role, SessionManager};
pub use peer::{Direction, PeerConnection, PeerInfo};
