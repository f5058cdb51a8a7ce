//! Control protocol
//!
//! Every command and every event travels as a [`ControlMessage`] envelope,
//! `{"type": "<tag>", "data": {...}}`, serialized as JSON text frames.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Wire envelope shared by commands and events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Map<String, Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ControlMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    fn str_field(&self, key: &str) -> Option<String> {
        self.data.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn number_field(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }
}

/// Inbound commands understood by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BecomeHost,
    ScanDevices,
    ConnectDevice { address: String },
    Play,
    Pause,
    Stop,
    Volume { level: f64 },
    SelectFile { path: String },
}

impl Command {
    /// Parse an envelope into a command.
    ///
    /// Returns `None` for unknown types and for envelopes whose required
    /// field is missing or of the wrong JSON type.
    pub fn from_message(msg: &ControlMessage) -> Option<Self> {
        match msg.kind.as_str() {
            "become_host" => Some(Self::BecomeHost),
            "scan_devices" => Some(Self::ScanDevices),
            "connect_device" => msg
                .str_field("address")
                .map(|address| Self::ConnectDevice { address }),
            "play" => Some(Self::Play),
            "pause" => Some(Self::Pause),
            "stop" => Some(Self::Stop),
            "volume" => msg.number_field("level").map(|level| Self::Volume { level }),
            "select_file" => msg.str_field("path").map(|path| Self::SelectFile { path }),
            _ => None,
        }
    }

    /// Wire form, used when forwarding a command to a remote host
    pub fn to_message(&self) -> ControlMessage {
        match self {
            Self::BecomeHost => ControlMessage::new("become_host"),
            Self::ScanDevices => ControlMessage::new("scan_devices"),
            Self::ConnectDevice { address } => {
                ControlMessage::new("connect_device").with("address", address.clone())
            }
            Self::Play => ControlMessage::new("play"),
            Self::Pause => ControlMessage::new("pause"),
            Self::Stop => ControlMessage::new("stop"),
            Self::Volume { level } => ControlMessage::new("volume").with("level", *level),
            Self::SelectFile { path } => {
                ControlMessage::new("select_file").with("path", path.clone())
            }
        }
    }

    /// Transport commands act on playback and are forwarded to the host
    /// when this node is a client
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Play | Self::Pause | Self::Stop | Self::Volume { .. })
    }
}

/// Outbound events
///
/// Positions and totals are expressed in samples per channel; durations in
/// seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    Status {
        message: String,
    },
    HostStarted {
        address: String,
        port: u16,
    },
    DeviceFound {
        name: String,
        address: String,
        #[serde(rename = "type")]
        kind: String,
    },
    Connected {
        address: String,
        name: String,
    },
    PlaybackStarted {
        position: f64,
    },
    PlaybackPaused {},
    PlaybackStopped {},
    ProgressUpdate {
        position: f64,
        total: f64,
    },
    VolumeChanged {
        level: f64,
    },
    FileLoaded {
        filename: String,
        duration: f64,
    },
    Log {
        message: String,
    },
}

impl Event {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }

    pub fn to_message(&self) -> serde_json::Result<ControlMessage> {
        serde_json::from_value(serde_json::to_value(self)?)
    }

    pub fn from_message(msg: &ControlMessage) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::to_value(msg)?)
    }
}

/// Outbound half of one connection.
///
/// Events emitted here are written, in order, to the connection that owns
/// the receiving end. Emitting after the connection closed is a no-op.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ControlMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: Event) {
        match event.to_message() {
            Ok(msg) => self.forward(msg),
            Err(e) => tracing::warn!("Failed to encode event {:?}: {}", event, e),
        }
    }

    pub fn log(&self, message: impl Into<String>) {
        self.emit(Event::log(message));
    }

    /// Pass a raw envelope through unchanged
    pub fn forward(&self, msg: ControlMessage) {
        if self.tx.send(msg).is_err() {
            tracing::trace!("Event dropped, connection closed");
        }
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_commands() {
        let msg = ControlMessage::from_json(r#"{"type":"volume","data":{"level":42}}"#).unwrap();
        assert_eq!(Command::from_message(&msg), Some(Command::Volume { level: 42.0 }));

        let msg = ControlMessage::from_json(
            r#"{"type":"connect_device","data":{"address":"10.0.0.5:9090"}}"#,
        )
        .unwrap();
        assert_eq!(
            Command::from_message(&msg),
            Some(Command::ConnectDevice {
                address: "10.0.0.5:9090".into()
            })
        );
    }

    #[test]
    fn test_missing_or_null_data() {
        let msg = ControlMessage::from_json(r#"{"type":"play"}"#).unwrap();
        assert_eq!(Command::from_message(&msg), Some(Command::Play));

        let msg = ControlMessage::from_json(r#"{"type":"stop","data":null}"#).unwrap();
        assert_eq!(Command::from_message(&msg), Some(Command::Stop));
    }

    #[test]
    fn test_unknown_and_malformed_are_dropped() {
        let unknown = ControlMessage::new("rewind");
        assert_eq!(Command::from_message(&unknown), None);

        let bad_level = ControlMessage::new("volume").with("level", "loud");
        assert_eq!(Command::from_message(&bad_level), None);

        let no_path = ControlMessage::new("select_file");
        assert_eq!(Command::from_message(&no_path), None);
    }

    #[test]
    fn test_event_wire_shape() {
        let msg = Event::PlaybackPaused {}.to_message().unwrap();
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "playback_paused", "data": {}})
        );

        let msg = Event::DeviceFound {
            name: "desk".into(),
            address: "10.0.0.7:9090".into(),
            kind: "host".into(),
        }
        .to_message()
        .unwrap();
        assert_eq!(msg.kind, "device_found");
        assert_eq!(msg.data["type"], json!("host"));

        let msg = Event::FileLoaded {
            filename: "song.wav".into(),
            duration: 2.0,
        }
        .to_message()
        .unwrap();
        assert_eq!(msg.data["duration"], json!(2.0));
    }

    #[test]
    fn test_event_back_from_message() {
        let msg = ControlMessage::new("progress_update")
            .with("position", 22050.0)
            .with("total", 88200.0);
        assert_eq!(
            Event::from_message(&msg).unwrap(),
            Event::ProgressUpdate {
                position: 22050.0,
                total: 88200.0
            }
        );
    }

    #[test]
    fn test_command_forward_form() {
        let cmd = Command::Volume { level: 30.0 };
        assert_eq!(Command::from_message(&cmd.to_message()), Some(cmd));
        assert!(Command::Play.is_transport());
        assert!(!Command::ScanDevices.is_transport());
    }

    #[test]
    fn test_sink_after_close() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        sink.log("nobody listening");
    }
}
