use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::value_objects::{Endpoint, SessionId, SessionOptions};

/// Video session aggregate root
/// One per streaming attempt; owned exclusively by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSession {
    pub id: SessionId,
    pub endpoint: Endpoint,
    pub options: SessionOptions,
    state: SessionState,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub playing_at: Option<DateTime<Utc>>,
}

impl VideoSession {
    /// Create a new session with a fresh identifier, at rest in `Idle`
    pub fn new(endpoint: Endpoint, options: SessionOptions) -> Self {
        Self {
            id: SessionId::generate(),
            endpoint,
            options,
            state: SessionState::Idle,
            created_at: Utc::now(),
            connected_at: None,
            playing_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn begin_connecting(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionState::SignalingConnecting)
    }

    pub fn mark_offer_sent(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionState::OfferSent)
    }

    /// Answer applied to the peer connection
    pub fn mark_connected(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionState::Connected)?;
        self.connected_at = Some(Utc::now());
        Ok(())
    }

    /// Remote media is flowing
    pub fn mark_playing(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionState::Playing)?;
        self.playing_at = Some(Utc::now());
        Ok(())
    }

    pub fn begin_stopping(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionState::Stopping)
    }

    pub fn finish_stopping(&mut self) -> Result<(), TransitionError> {
        self.transition(SessionState::Idle)
    }

    fn transition(&mut self, to: SessionState) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Session state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    SignalingConnecting,
    OfferSent,
    Connected,
    Playing,
    Stopping,
}

impl SessionState {
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        match (self, to) {
            (Idle, SignalingConnecting)
            | (SignalingConnecting, OfferSent)
            | (OfferSent, Connected)
            | (Connected, Playing)
            | (Stopping, Idle) => true,
            (from, Stopping) => !matches!(from, Idle | Stopping),
            _ => false,
        }
    }

    /// ICE candidates flow in either direction in these states
    pub fn accepts_candidates(self) -> bool {
        matches!(
            self,
            SessionState::OfferSent | SessionState::Connected | SessionState::Playing
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::SignalingConnecting => "signaling-connecting",
            SessionState::OfferSent => "offer-sent",
            SessionState::Connected => "connected",
            SessionState::Playing => "playing",
            SessionState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid session transition from {from} to {to}")]
pub struct TransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> VideoSession {
        VideoSession::new(
            Endpoint::new("10.0.0.5", 8765).unwrap(),
            SessionOptions::default(),
        )
    }

    #[test]
    fn test_session_creation() {
        let session = session();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(session.connected_at.is_none());
        assert!(session.playing_at.is_none());
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = session();

        session.begin_connecting().unwrap();
        session.mark_offer_sent().unwrap();
        session.mark_connected().unwrap();
        assert!(session.connected_at.is_some());
        session.mark_playing().unwrap();
        assert_eq!(session.state(), SessionState::Playing);
        assert!(session.playing_at.is_some());

        session.begin_stopping().unwrap();
        session.finish_stopping().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let mut session = session();
        session.begin_connecting().unwrap();

        let err = session.mark_connected().unwrap_err();
        assert_eq!(err.from, SessionState::SignalingConnecting);
        assert_eq!(err.to, SessionState::Connected);
        assert_eq!(session.state(), SessionState::SignalingConnecting);
    }

    #[test]
    fn test_stopping_reachable_from_every_live_state() {
        use SessionState::*;
        for state in [SignalingConnecting, OfferSent, Connected, Playing] {
            assert!(state.can_transition_to(Stopping), "{state} -> stopping");
        }
        assert!(!Idle.can_transition_to(Stopping));
        assert!(!Stopping.can_transition_to(Stopping));
    }

    #[test]
    fn test_candidate_states() {
        assert!(!SessionState::SignalingConnecting.accepts_candidates());
        assert!(SessionState::OfferSent.accepts_candidates());
        assert!(SessionState::Playing.accepts_candidates());
    }
}
