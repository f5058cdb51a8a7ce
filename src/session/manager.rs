//! Session manager
//!
//! Holds this node's role and every open peer connection, keyed by remote
//! address. Connections enter the registry on a successful dial or accept
//! and leave it the first time a read on them fails.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config::ControlConfig;
use crate::constants::REMOTE_HOST_NAME;
use crate::error::NetworkError;
use crate::network::{self, local_ipv4, normalize_peer_address};
use crate::protocol::{Command, ControlMessage, Event, EventSink};
use crate::session::peer::{Direction, PeerConnection, PeerInfo};

/// Role of this node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Unset,
    Host,
    Client,
}

pub struct SessionManager {
    role: RwLock<Role>,
    peers: DashMap<String, PeerConnection>,
    control: ControlConfig,
    started_at: DateTime<Utc>,
}

impl SessionManager {
    pub fn new(control: ControlConfig) -> Self {
        Self {
            role: RwLock::new(Role::Unset),
            peers: DashMap::new(),
            control,
            started_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        *self.role.read()
    }

    /// Become the host and announce where this node can be reached.
    /// Calling it again re-announces.
    pub fn become_host(&self, sink: &EventSink) {
        *self.role.write() = Role::Host;
        let address = local_ipv4().to_string();
        let port = self.control.port;

        info!("Now hosting at {}:{}", address, port);
        sink.emit(Event::HostStarted {
            address: address.clone(),
            port,
        });
        sink.log(format!("Now hosting at {}", address));
    }

    /// Dial a remote host and relay what it sends to `relay`.
    ///
    /// The role switches to client only once the connection is up; on
    /// failure role and registry are untouched and the error is returned
    /// for the caller to report.
    pub async fn connect_to_peer(
        self: &Arc<Self>,
        address: &str,
        relay: &EventSink,
    ) -> Result<(), NetworkError> {
        let address = normalize_peer_address(address);
        let timeout = self.control.connect_timeout();
        let link = network::connect(&address, &self.control.path, timeout).await?;

        *self.role.write() = Role::Client;
        let conn =
            PeerConnection::new(address.clone(), Direction::Outbound, link.sink, link.cancel);
        let id = conn.id;
        if let Some(previous) = self.peers.insert(address.clone(), conn) {
            previous.close();
        }

        info!("Connected to host {}", link.url);
        relay.emit(Event::Connected {
            address: address.clone(),
            name: REMOTE_HOST_NAME.to_string(),
        });
        relay.log(format!("Connected to host: {}", address));

        self.spawn_relay(address, id, link.incoming, relay.clone());
        Ok(())
    }

    fn spawn_relay(
        self: &Arc<Self>,
        address: String,
        id: Uuid,
        mut incoming: mpsc::UnboundedReceiver<ControlMessage>,
        relay: EventSink,
    ) {
        let session: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(msg) = incoming.recv().await {
                relay.forward(msg);
            }
            if let Some(session) = session.upgrade() {
                if session.remove(&address, id) {
                    info!("Host {} disconnected", address);
                    relay.log(format!("Disconnected from host: {}", address));
                }
            }
        });
    }

    /// Track a connection accepted by the control server.
    ///
    /// Returns the registry id and a token that is cancelled when the
    /// session wants the connection closed.
    pub fn register_inbound(&self, address: String, sink: EventSink) -> (Uuid, CancellationToken) {
        let cancel = CancellationToken::new();
        let conn = PeerConnection::new(address.clone(), Direction::Inbound, sink, cancel.clone());
        let id = conn.id;
        if let Some(previous) = self.peers.insert(address, conn) {
            previous.close();
        }
        (id, cancel)
    }

    /// Drop a connection from the registry if it is still the one with `id`
    pub fn remove(&self, address: &str, id: Uuid) -> bool {
        self.peers.remove_if(address, |_, conn| conn.id == id).is_some()
    }

    /// Send a transport command to every host this node is a client of.
    /// Returns how many hosts it went to.
    pub fn forward_to_hosts(&self, command: &Command) -> usize {
        let msg = command.to_message();
        let mut sent = 0;
        for conn in self.peers.iter().filter(|c| c.direction == Direction::Outbound) {
            conn.send(msg.clone());
            sent += 1;
        }
        sent
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self.peers.iter().map(|c| c.info()).collect();
        peers.sort_by_key(|p| p.connected_at);
        peers
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.started_at).num_seconds().max(0) as u64
    }

    /// Close every connection, used on shutdown
    pub fn close_all(&self) {
        for conn in self.peers.iter() {
            conn.close();
        }
        self.peers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ControlMessage>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            events.push(Event::from_message(&msg).unwrap());
        }
        events
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_become_host() {
        let session = SessionManager::new(ControlConfig::default());
        let (sink, mut rx) = EventSink::channel();

        session.become_host(&sink);
        session.become_host(&sink);
        assert_eq!(session.role(), Role::Host);

        let events = drain(&mut rx);
        assert_eq!(events.len(), 4);
        match &events[0] {
            Event::HostStarted { address, port } => {
                assert_eq!(*port, 9090);
                assert!(address.parse::<std::net::IpAddr>().is_ok());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            &events[1],
            Event::Log { message } if message.starts_with("Now hosting at")
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_role() {
        let session = Arc::new(SessionManager::new(ControlConfig::default()));
        let (sink, mut rx) = EventSink::channel();
        session.become_host(&sink);
        drain(&mut rx);

        let address = format!("127.0.0.1:{}", closed_port().await);
        let err = session.connect_to_peer(&address, &sink).await.unwrap_err();

        assert!(err.to_string().starts_with("Remote connect failed"));
        assert_eq!(session.role(), Role::Host);
        assert_eq!(session.peer_count(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_connect_relays_and_tears_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"status","data":{"message":"Backend Ready"}}"#.into()))
                .await
                .unwrap();
            // Wait for one forwarded command, then hang up
            let forwarded = ws.next().await.unwrap().unwrap();
            assert_eq!(forwarded.into_text().unwrap(), r#"{"type":"play","data":{}}"#);
            ws.close(None).await.unwrap();
        });

        let session = Arc::new(SessionManager::new(ControlConfig::default()));
        let (sink, mut rx) = EventSink::channel();
        session.connect_to_peer(&address, &sink).await.unwrap();

        assert_eq!(session.role(), Role::Client);
        assert_eq!(session.peers()[0].direction, Direction::Outbound);
        assert_eq!(session.forward_to_hosts(&Command::Play), 1);

        let mut events = Vec::new();
        while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            events.push(Event::from_message(&msg).unwrap());
            let disconnected = matches!(
                events.last(),
                Some(Event::Log { message }) if message.starts_with("Disconnected")
            );
            if disconnected {
                break;
            }
        }

        assert_eq!(
            events[0],
            Event::Connected {
                address: address.clone(),
                name: "Remote Host".into()
            }
        );
        assert!(events.contains(&Event::Status {
            message: "Backend Ready".into()
        }));
        assert_eq!(session.peer_count(), 0);
    }

    #[test]
    fn test_remove_checks_id() {
        let session = SessionManager::new(ControlConfig::default());
        let (sink, _rx) = EventSink::channel();
        let (first, _) = session.register_inbound("10.0.0.9:5000".into(), sink.clone());
        let (second, replaced) = session.register_inbound("10.0.0.9:5001".into(), sink.clone());
        let (third, _) = session.register_inbound("10.0.0.9:5001".into(), sink);

        assert!(replaced.is_cancelled());
        assert!(!session.remove("10.0.0.9:5001", second));
        assert!(session.remove("10.0.0.9:5001", third));
        assert!(session.remove("10.0.0.9:5000", first));
        assert_eq!(session.peer_count(), 0);
    }

    #[test]
    fn test_inbound_peers_are_not_forwarded_to() {
        let session = SessionManager::new(ControlConfig::default());
        let (sink, mut rx) = EventSink::channel();
        session.register_inbound("10.0.0.9:5000".into(), sink);

        assert_eq!(session.forward_to_hosts(&Command::Stop), 0);
        assert!(rx.try_recv().is_err());
    }
}
