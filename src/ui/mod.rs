//! Control server: duplex WebSocket endpoint plus a small HTTP API

pub mod handlers;
pub mod server;
pub mod websocket;

pub use server::{router, AppState, WebServer};
