//! Outbound control connection to a remote host

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::NetworkError;
use crate::protocol::{ControlMessage, EventSink};

/// Live connection to a remote host.
///
/// `sink` writes envelopes to the host. `incoming` yields envelopes the
/// host sends and returns `None` after the first read failure or close.
pub struct PeerLink {
    pub url: String,
    pub sink: EventSink,
    pub incoming: mpsc::UnboundedReceiver<ControlMessage>,
    pub cancel: CancellationToken,
}

/// Dial `ws://<address><path>` and spawn the reader and writer tasks.
pub async fn connect(
    address: &str,
    path: &str,
    timeout: Duration,
) -> Result<PeerLink, NetworkError> {
    let url = format!("ws://{}{}", address, path);
    debug!("Dialing {}", url);

    let (ws_stream, _) = tokio::time::timeout(timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| {
            NetworkError::ConnectFailure(format!("{}: timed out after {:?}", url, timeout))
        })?
        .map_err(|e| NetworkError::ConnectFailure(format!("{}: {}", url, e)))?;

    let (mut write, mut read) = ws_stream.split();
    let (sink, mut outgoing) = EventSink::channel();
    let (incoming_tx, incoming) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let writer_cancel = cancel.clone();
    let writer_url = url.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_cancel.cancelled() => break,
                msg = outgoing.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match msg.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode message for {}: {}", writer_url, e);
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        debug!("Write to {} failed: {}", writer_url, e);
                        break;
                    }
                }
            }
        }
        let _ = write.close().await;
    });

    let reader_cancel = cancel.clone();
    let reader_url = url.clone();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = reader_cancel.cancelled() => break,
                frame = read.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => match ControlMessage::from_json(&text) {
                    Ok(msg) => {
                        if incoming_tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Malformed message from {}: {}", reader_url, e),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Read from {} failed: {}", reader_url, e);
                    break;
                }
            }
        }
        // Writer stops with the reader so the socket is released
        reader_cancel.cancel();
    });

    Ok(PeerLink {
        url,
        sink,
        incoming,
        cancel,
    })
}
