use shared::{MessageType, StatsPayload};

use crate::domain::aggregates::SessionState;
use crate::domain::value_objects::SessionId;

/// Diagnostics emitted by the orchestrator. Envelopes are identified by type only.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged {
        session_id: SessionId,
        from: SessionState,
        to: SessionState,
    },
    EnvelopeSent {
        session_id: SessionId,
        message_type: MessageType,
    },
    EnvelopeReceived {
        session_id: SessionId,
        message_type: MessageType,
    },
    /// Inbound envelope carrying a non-current session id
    EnvelopeDropped {
        message_type: MessageType,
        session_id: String,
    },
    StatsUpdated {
        session_id: SessionId,
        stats: StatsPayload,
    },
    HostVideoState {
        session_id: SessionId,
        state: String,
        reason: Option<String>,
    },
    MediaReady {
        session_id: SessionId,
    },
    Stopped {
        session_id: SessionId,
        reason: String,
        fatal: bool,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::StateChanged { .. } => "state_changed",
            SessionEvent::EnvelopeSent { .. } => "envelope_sent",
            SessionEvent::EnvelopeReceived { .. } => "envelope_received",
            SessionEvent::EnvelopeDropped { .. } => "envelope_dropped",
            SessionEvent::StatsUpdated { .. } => "stats_updated",
            SessionEvent::HostVideoState { .. } => "host_video_state",
            SessionEvent::MediaReady { .. } => "media_ready",
            SessionEvent::Stopped { .. } => "stopped",
        }
    }
}
