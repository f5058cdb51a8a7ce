//! Registered peer connection

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::{ControlMessage, EventSink};

/// Who opened the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Accepted by our control server (front end or remote client)
    Inbound,
    /// Dialed by us toward a remote host
    Outbound,
}

/// A live duplex connection tracked by the session
#[derive(Debug)]
pub struct PeerConnection {
    pub id: Uuid,
    pub address: String,
    pub direction: Direction,
    pub connected_at: DateTime<Utc>,
    sink: EventSink,
    cancel: CancellationToken,
}

impl PeerConnection {
    pub fn new(
        address: String,
        direction: Direction,
        sink: EventSink,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            address,
            direction,
            connected_at: Utc::now(),
            sink,
            cancel,
        }
    }

    /// Queue an envelope for the remote end
    pub fn send(&self, msg: ControlMessage) {
        self.sink.forward(msg);
    }

    /// Ask the connection's tasks to shut down
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id,
            address: self.address.clone(),
            direction: self.direction,
            connected_at: self.connected_at,
        }
    }
}

/// Serializable view of a [`PeerConnection`]
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub id: Uuid,
    pub address: String,
    pub direction: Direction,
    pub connected_at: DateTime<Utc>,
}
