//! Message dispatcher
//!
//! Turns inbound envelopes into calls on the engine, the session and the
//! discovery backend. Every handler error is reported to the requesting
//! connection as a `log` event; nothing here ends a connection.

use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::audio::AudioEngine;
use crate::config::DiscoveryConfig;
use crate::discovery::Discovery;
use crate::protocol::{Command, ControlMessage, Event, EventSink};
use crate::session::{Role, SessionManager};

#[derive(Clone)]
pub struct Dispatcher {
    engine: AudioEngine,
    session: Arc<SessionManager>,
    discovery: Arc<dyn Discovery>,
    discovery_config: DiscoveryConfig,
}

impl Dispatcher {
    pub fn new(
        engine: AudioEngine,
        session: Arc<SessionManager>,
        discovery: Arc<dyn Discovery>,
        discovery_config: DiscoveryConfig,
    ) -> Self {
        Self {
            engine,
            session,
            discovery,
            discovery_config,
        }
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Handle one envelope. Events go to `sink`, the originating connection.
    pub async fn dispatch(&self, msg: ControlMessage, sink: &EventSink) {
        let Some(command) = Command::from_message(&msg) else {
            trace!("Dropping message of type {:?}", msg.kind);
            return;
        };
        debug!("Dispatching {:?}", command);

        if command.is_transport() && self.session.role() == Role::Client {
            let sent = self.session.forward_to_hosts(&command);
            if sent > 0 {
                debug!("Forwarded {} to {} host(s)", msg.kind, sent);
                return;
            }
        }

        match command {
            Command::BecomeHost => self.session.become_host(sink),
            Command::ScanDevices => self.scan_devices(sink).await,
            Command::ConnectDevice { address } => {
                if let Err(e) = self.session.connect_to_peer(&address, sink).await {
                    warn!("{}", e);
                    sink.log(e.to_string());
                }
            }
            Command::Play => {
                if let Err(e) = self.engine.play(sink) {
                    warn!("Play failed: {}", e);
                    sink.log(e.to_string());
                }
            }
            Command::Pause => self.engine.pause(sink),
            Command::Stop => self.engine.stop(sink),
            Command::Volume { level } => self.engine.set_volume(level, sink),
            Command::SelectFile { path } => {
                if self.session.role() == Role::Client {
                    // Clients play the host's track; the path names a local file
                    debug!("Ignoring select_file for {} in client role", path);
                    sink.log("File selection is only available on the host");
                    return;
                }
                self.select_file(path, sink).await
            }
        }
    }

    async fn select_file(&self, path: String, sink: &EventSink) {
        let engine = self.engine.clone();
        let load_sink = sink.clone();
        let result = tokio::task::spawn_blocking(move || engine.load(&path, &load_sink)).await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Load failed: {}", e);
                sink.log(e.to_string());
            }
            Err(e) => {
                warn!("Load task failed: {}", e);
                sink.log(format!("Decode failed: {}", e));
            }
        }
    }

    async fn scan_devices(&self, sink: &EventSink) {
        let service_type = &self.discovery_config.service_type;
        let timeout = self.discovery_config.browse_timeout();
        let mut results = match self.discovery.browse(service_type, timeout) {
            Ok(results) => results,
            Err(e) => {
                warn!("{}", e);
                sink.log(e.to_string());
                return;
            }
        };

        let mut found = 0;
        while let Some(record) = results.next().await {
            found += 1;
            sink.emit(Event::DeviceFound {
                name: record.display_name,
                address: record.address,
                kind: "host".to_string(),
            });
        }
        debug!("Scan finished, {} host(s) found", found);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::testing::ManualOutput;
    use crate::config::{ControlConfig, PlaybackConfig};
    use crate::discovery::{Advertisement, BrowseResults, DiscoveryRecord};
    use crate::error::DiscoveryError;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct StaticDiscovery(Vec<DiscoveryRecord>);

    impl Discovery for StaticDiscovery {
        fn advertise(&self, _ad: &Advertisement) -> Result<(), DiscoveryError> {
            Ok(())
        }

        fn browse(
            &self,
            _service_type: &str,
            _timeout: Duration,
        ) -> Result<BrowseResults, DiscoveryError> {
            Ok(BrowseResults::from_records(self.0.clone()))
        }
    }

    fn write_wav(path: &Path, sample_rate: u32, frames: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 64) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn drain(rx: &mut UnboundedReceiver<ControlMessage>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            events.push(Event::from_message(&msg).unwrap());
        }
        events
    }

    fn logs(events: &[Event]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::Log { message } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    fn dispatcher(records: Vec<DiscoveryRecord>) -> Dispatcher {
        let engine = AudioEngine::new(ManualOutput::new(), &PlaybackConfig::default());
        let session = Arc::new(SessionManager::new(ControlConfig::default()));
        let discovery = Arc::new(StaticDiscovery(records));
        Dispatcher::new(engine, session, discovery, DiscoveryConfig::default())
    }

    fn msg(json: &str) -> ControlMessage {
        ControlMessage::from_json(json).unwrap()
    }

    #[tokio::test]
    async fn test_select_file_reports_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_seconds.wav");
        write_wav(&path, 44100, 88200);

        let dispatcher = dispatcher(Vec::new());
        let (sink, mut rx) = EventSink::channel();
        let select = ControlMessage::new("select_file").with("path", path.to_str().unwrap());
        dispatcher.dispatch(select, &sink).await;

        match drain(&mut rx).as_slice() {
            [Event::FileLoaded { filename, duration }] => {
                assert_eq!(filename, path.to_str().unwrap());
                assert_eq!(*duration, 2.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_file_logs_once() {
        let dispatcher = dispatcher(Vec::new());
        let (sink, mut rx) = EventSink::channel();

        dispatcher
            .dispatch(msg(r#"{"type":"select_file","data":{"path":"/music/song.flac"}}"#), &sink)
            .await;

        let events = drain(&mut rx);
        assert_eq!(logs(&events), vec!["Unsupported format: .flac"]);
        assert_eq!(events.len(), 1);
        assert_eq!(dispatcher.engine().state(), crate::audio::PlaybackState::Idle);
    }

    #[tokio::test]
    async fn test_play_without_file() {
        let dispatcher = dispatcher(Vec::new());
        let (sink, mut rx) = EventSink::channel();

        dispatcher.dispatch(msg(r#"{"type":"play","data":{}}"#), &sink).await;
        assert_eq!(logs(&drain(&mut rx)), vec!["No audio file loaded"]);
    }

    #[tokio::test]
    async fn test_unknown_and_incomplete_are_silent() {
        let dispatcher = dispatcher(Vec::new());
        let (sink, mut rx) = EventSink::channel();

        dispatcher.dispatch(msg(r#"{"type":"rewind","data":{}}"#), &sink).await;
        dispatcher.dispatch(msg(r#"{"type":"volume","data":{}}"#), &sink).await;
        dispatcher.dispatch(msg(r#"{"type":"connect_device"}"#), &sink).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_volume_event() {
        let dispatcher = dispatcher(Vec::new());
        let (sink, mut rx) = EventSink::channel();

        dispatcher.dispatch(msg(r#"{"type":"volume","data":{"level":150}}"#), &sink).await;
        assert_eq!(drain(&mut rx), vec![Event::VolumeChanged { level: 100.0 }]);
        assert_eq!(dispatcher.engine().gain(), 0.0);
    }

    #[tokio::test]
    async fn test_scan_emits_each_host() {
        let records = vec![
            DiscoveryRecord {
                display_name: "desk-10.0.0.7".into(),
                address: "10.0.0.7:9090".into(),
                service_type: "_lan-bt-audio._tcp.local.".into(),
            },
            DiscoveryRecord {
                display_name: "den-10.0.0.8".into(),
                address: "10.0.0.8:9090".into(),
                service_type: "_lan-bt-audio._tcp.local.".into(),
            },
        ];
        let dispatcher = dispatcher(records);
        let (sink, mut rx) = EventSink::channel();

        dispatcher.dispatch(ControlMessage::new("scan_devices"), &sink).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            Event::DeviceFound {
                name: "den-10.0.0.8".into(),
                address: "10.0.0.8:9090".into(),
                kind: "host".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_connect_logs_once() {
        let dispatcher = dispatcher(Vec::new());
        let (sink, mut rx) = EventSink::channel();

        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let connect = ControlMessage::new("connect_device")
            .with("address", format!("127.0.0.1:{}", port));
        dispatcher.dispatch(connect, &sink).await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(logs(&events)[0].starts_with("Remote connect failed"));
        assert_eq!(dispatcher.session().role(), Role::Unset);
        assert_eq!(dispatcher.session().peer_count(), 0);
    }

    #[tokio::test]
    async fn test_become_host_events() {
        let dispatcher = dispatcher(Vec::new());
        let (sink, mut rx) = EventSink::channel();

        dispatcher.dispatch(ControlMessage::new("become_host"), &sink).await;

        let events = drain(&mut rx);
        assert!(matches!(events[0], Event::HostStarted { port: 9090, .. }));
        assert_eq!(dispatcher.session().role(), Role::Host);
    }

    #[tokio::test]
    async fn test_play_pause_play_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8000, 8000);

        let output = ManualOutput::new();
        let engine = AudioEngine::new(output.clone(), &PlaybackConfig::default());
        let session = Arc::new(SessionManager::new(ControlConfig::default()));
        let discovery = Arc::new(StaticDiscovery(Vec::new()));
        let dispatcher = Dispatcher::new(engine, session, discovery, DiscoveryConfig::default());
        let (sink, mut rx) = EventSink::channel();

        let select = ControlMessage::new("select_file").with("path", path.to_str().unwrap());
        dispatcher.dispatch(select, &sink).await;
        dispatcher.dispatch(ControlMessage::new("play"), &sink).await;
        output.pump(2000);
        dispatcher.dispatch(ControlMessage::new("pause"), &sink).await;
        output.pump(500);
        dispatcher.dispatch(ControlMessage::new("play"), &sink).await;

        let started: Vec<f64> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                Event::PlaybackStarted { position } => Some(position),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0.0, 2000.0]);
        dispatcher.dispatch(ControlMessage::new("stop"), &sink).await;
    }
}
