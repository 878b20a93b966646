use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding signaling traffic
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message is not a JSON object")]
    NotAnObject,
    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),
}

/// Envelope tag. Unrecognized tags are kept verbatim in `Unknown` so that
/// newer hosts can add message types without breaking older clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    Hello,
    HelloAck,
    StartVideo,
    StopVideo,
    Offer,
    Answer,
    IceCandidate,
    VideoState,
    Stats,
    Error,
    Pong,
    Unknown(String),
}

impl MessageType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "hello" => Self::Hello,
            "hello_ack" => Self::HelloAck,
            "start_video" => Self::StartVideo,
            "stop_video" => Self::StopVideo,
            "offer" => Self::Offer,
            "answer" => Self::Answer,
            "ice_candidate" => Self::IceCandidate,
            "video_state" => Self::VideoState,
            "stats" => Self::Stats,
            "error" => Self::Error,
            "pong" => Self::Pong,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Hello => "hello",
            Self::HelloAck => "hello_ack",
            Self::StartVideo => "start_video",
            Self::StopVideo => "stop_video",
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice_candidate",
            Self::VideoState => "video_state",
            Self::Stats => "stats",
            Self::Error => "error",
            Self::Pong => "pong",
            Self::Unknown(tag) => tag,
        }
    }

    /// Types that never drive the session state machine
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            Self::HelloAck | Self::VideoState | Self::Stats | Self::Pong | Self::Unknown(_)
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

/// Signaling message unit: `{ "type", "session_id", "payload" }`
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub message_type: MessageType,
    pub session_id: String,
    pub payload: Value,
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    #[serde(rename = "type")]
    message_type: &'a str,
    session_id: &'a str,
    payload: &'a Value,
}

impl Envelope {
    /// Build an envelope from a typed payload. The payload must serialize to a JSON object.
    pub fn new<P: Serialize>(
        message_type: MessageType,
        session_id: impl Into<String>,
        payload: &P,
    ) -> Result<Self, ProtocolError> {
        let payload =
            serde_json::to_value(payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if !payload.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        Ok(Self {
            message_type,
            session_id: session_id.into(),
            payload,
        })
    }

    /// Envelope with an empty `{}` payload
    pub fn empty(message_type: MessageType, session_id: impl Into<String>) -> Self {
        Self {
            message_type,
            session_id: session_id.into(),
            payload: Value::Object(Map::new()),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(&self.wire()).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn to_text(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(&self.wire()).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    fn wire(&self) -> WireEnvelope<'_> {
        WireEnvelope {
            message_type: self.message_type.as_str(),
            session_id: &self.session_id,
            payload: &self.payload,
        }
    }

    /// Lenient decode: a missing or non-string `type`/`session_id` becomes an
    /// empty string and a missing or non-object `payload` becomes `{}`.
    /// Only input that is not a JSON object at all is rejected.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let message_type = object
            .get("type")
            .and_then(Value::as_str)
            .map(MessageType::parse)
            .unwrap_or_else(|| MessageType::Unknown(String::new()));
        let session_id = object
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let payload = match object.remove("payload") {
            Some(payload @ Value::Object(_)) => payload,
            _ => Value::Object(Map::new()),
        };

        Ok(Self {
            message_type,
            session_id,
            payload,
        })
    }

    /// Decode the payload into a typed shape; optional fields take their defaults.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| ProtocolError::Malformed(format!("{} payload: {}", self.message_type, e)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelloPayload {
    pub app_version: String,
    pub video_preset: String,
    pub client_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopVideoPayload {
    pub reason: String,
}

/// Offer or answer description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdpPayload {
    pub sdp: String,
}

/// An empty `candidate` marks end-of-candidates; a missing one is malformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IceCandidatePayload {
    pub candidate: String,
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoStatePayload {
    pub state: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsPayload {
    pub fps: f64,
    pub bitrate_kbps: f64,
    pub frame_drops: u64,
    pub rtt_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPayload {
    pub message: String,
}
