//! Duplex control endpoint
//!
//! Each accepted connection gets a read loop that dispatches commands in
//! arrival order and a writer task draining the connection's event channel.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::protocol::{ControlMessage, Event, EventSink};
use crate::ui::server::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (sink, mut outgoing) = EventSink::channel();
    let address = addr.to_string();
    let session = state.dispatcher.session().clone();

    let (id, cancel) = session.register_inbound(address.clone(), sink.clone());
    info!("Control connection from {}", address);
    sink.emit(Event::Status {
        message: "Backend Ready".to_string(),
    });

    let writer = tokio::spawn(async move {
        while let Some(msg) = outgoing.recv().await {
            let text = match msg.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode {}: {}", msg.kind, e);
                    continue;
                }
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = receiver.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(text))) => match ControlMessage::from_json(&text) {
                Ok(msg) => state.dispatcher.dispatch(msg, &sink).await,
                Err(e) => warn!("Malformed message from {}: {}", address, e),
            },
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                debug!("Read from {} failed: {}", address, e);
                break;
            }
        }
    }

    session.remove(&address, id);
    // Notifier and relay tasks may still hold the sink, so the writer never
    // sees the channel close on its own
    writer.abort();
    info!("Control connection from {} closed", address);
}
