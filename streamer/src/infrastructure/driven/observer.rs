use chrono::{DateTime, Utc};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::application::ports::SessionObserver;
use crate::domain::{DomainEvent, SessionEvent, SessionState};

/// Writes session diagnostics to the log. Payloads are never logged.
#[derive(Debug, Default)]
pub struct TracingSessionObserver {
    /// When the running session left `Idle`
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl TracingSessionObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks session start and returns how long a session ran once it stops.
    fn track_run(&self, event: &DomainEvent<SessionEvent>) -> Option<chrono::Duration> {
        let Ok(mut started_at) = self.started_at.lock() else {
            return None;
        };
        match &event.data {
            SessionEvent::StateChanged {
                from: SessionState::Idle,
                ..
            } => {
                *started_at = Some(event.occurred_at);
                None
            }
            SessionEvent::Stopped { .. } => started_at.take().map(|start| event.since(start)),
            _ => None,
        }
    }
}

impl SessionObserver for TracingSessionObserver {
    fn on_event(&self, event: &DomainEvent<SessionEvent>) {
        let ran_for = self.track_run(event);
        match &event.data {
            SessionEvent::StateChanged {
                session_id,
                from,
                to,
            } => info!(
                session_id = %session_id,
                seq = event.sequence,
                "Session state {} -> {}",
                from,
                to
            ),
            SessionEvent::EnvelopeSent {
                session_id,
                message_type,
            } => debug!(session_id = %session_id, "Sent {}", message_type),
            SessionEvent::EnvelopeReceived {
                session_id,
                message_type,
            } => debug!(session_id = %session_id, "Received {}", message_type),
            SessionEvent::EnvelopeDropped {
                message_type,
                session_id,
            } => debug!("Dropped stale {} for session '{}'", message_type, session_id),
            SessionEvent::StatsUpdated { session_id, .. } => {
                debug!(session_id = %session_id, "Host stats updated")
            }
            SessionEvent::HostVideoState {
                session_id,
                state,
                reason,
            } => debug!(
                session_id = %session_id,
                "Host video state {} ({})",
                state,
                reason.as_deref().unwrap_or("no reason")
            ),
            SessionEvent::MediaReady { session_id } => {
                debug!(session_id = %session_id, "Remote media ready")
            }
            SessionEvent::Stopped {
                session_id,
                reason,
                fatal,
            } => info!(
                session_id = %session_id,
                seq = event.sequence,
                ran_ms = ran_for.map(|d| d.num_milliseconds()).unwrap_or_default(),
                "Session stopped (fatal: {}): {}",
                fatal,
                reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionId;
    use shared::MessageType;

    #[test]
    fn test_observer_accepts_every_event() {
        let observer = TracingSessionObserver::new();
        let session_id = SessionId::generate();
        let events = vec![
            SessionEvent::StateChanged {
                session_id: session_id.clone(),
                from: SessionState::Idle,
                to: SessionState::SignalingConnecting,
            },
            SessionEvent::EnvelopeSent {
                session_id: session_id.clone(),
                message_type: MessageType::Offer,
            },
            SessionEvent::EnvelopeDropped {
                message_type: MessageType::Answer,
                session_id: "old".to_string(),
            },
            SessionEvent::Stopped {
                session_id,
                reason: "stopped by user".to_string(),
                fatal: false,
            },
        ];

        for (sequence, event) in (1..).zip(events) {
            observer.on_event(&DomainEvent::new(sequence, event));
        }
    }

    #[test]
    fn test_run_length_measured_from_leaving_idle() {
        let observer = TracingSessionObserver::new();
        let session_id = SessionId::generate();
        let start = Utc::now();

        let started = DomainEvent::at(
            1,
            start,
            SessionEvent::StateChanged {
                session_id: session_id.clone(),
                from: SessionState::Idle,
                to: SessionState::SignalingConnecting,
            },
        );
        let offered = DomainEvent::at(
            2,
            start + chrono::Duration::milliseconds(300),
            SessionEvent::StateChanged {
                session_id: session_id.clone(),
                from: SessionState::SignalingConnecting,
                to: SessionState::OfferSent,
            },
        );
        let stopped = DomainEvent::at(
            3,
            start + chrono::Duration::milliseconds(2500),
            SessionEvent::Stopped {
                session_id,
                reason: "stopped by user".to_string(),
                fatal: false,
            },
        );

        assert_eq!(observer.track_run(&started), None);
        assert_eq!(observer.track_run(&offered), None);
        assert_eq!(
            observer.track_run(&stopped).map(|d| d.num_milliseconds()),
            Some(2500)
        );
        // A second stop without a new start has nothing to measure
        assert_eq!(observer.track_run(&stopped), None);
    }
}
