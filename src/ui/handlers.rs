//! HTTP API handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::audio::{list_output_devices, OutputDeviceInfo, PlaybackSnapshot};
use crate::session::{PeerInfo, Role};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// System status
#[derive(serde::Serialize)]
pub struct SystemStatus {
    pub role: Role,
    pub peer_count: usize,
    pub playback: PlaybackSnapshot,
    pub uptime_seconds: u64,
}

/// Get system status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let session = state.dispatcher.session();
    let status = SystemStatus {
        role: session.role(),
        peer_count: session.peer_count(),
        playback: state.dispatcher.engine().snapshot(),
        uptime_seconds: session.uptime_seconds(),
    };

    Json(ApiResponse::ok(status))
}

/// List open control connections
pub async fn get_peers(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<PeerInfo>>> {
    Json(ApiResponse::ok(state.dispatcher.session().peers()))
}

/// Get available output devices
pub async fn get_devices() -> Json<ApiResponse<Vec<OutputDeviceInfo>>> {
    match tokio::task::spawn_blocking(list_output_devices).await {
        Ok(devices) => Json(ApiResponse::ok(devices)),
        Err(e) => Json(ApiResponse::error(format!("Device enumeration failed: {}", e))),
    }
}
