use async_trait::async_trait;
use shared::IceCandidatePayload;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Adapter contract version this orchestrator is written against
pub const REQUIRED_PEER_API_VERSION: u32 = 1;

/// What a peer connection adapter declares about itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCapabilities {
    pub api_version: u32,
    pub trickle_ice: bool,
}

impl PeerCapabilities {
    /// Explicit capability check performed before the adapter is initialized
    pub fn negotiate(&self) -> Result<(), CapabilityError> {
        if self.api_version != REQUIRED_PEER_API_VERSION {
            return Err(CapabilityError::IncompatibleVersion {
                found: self.api_version,
                required: REQUIRED_PEER_API_VERSION,
            });
        }
        if !self.trickle_ice {
            return Err(CapabilityError::TrickleIceUnsupported);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("peer adapter API v{found} is not compatible with required v{required}")]
    IncompatibleVersion { found: u32, required: u32 },
    #[error("peer adapter does not support trickle ICE")]
    TrickleIceUnsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

impl From<IceCandidatePayload> for IceCandidate {
    fn from(payload: IceCandidatePayload) -> Self {
        Self {
            candidate: payload.candidate,
            sdp_mid: payload.sdp_mid,
            sdp_mline_index: payload.sdp_mline_index,
        }
    }
}

impl From<IceCandidate> for IceCandidatePayload {
    fn from(candidate: IceCandidate) -> Self {
        Self {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    LocalCandidate(IceCandidate),
    ConnectionStateChanged(PeerConnectionState),
    /// First remote frame is available
    RemoteMediaReady,
    Error(String),
}

pub type PeerEventSender = mpsc::UnboundedSender<PeerEvent>;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error("peer connection is not initialized")]
    NotInitialized,
    #[error("negotiation failed: {0}")]
    Negotiation(String),
    #[error("peer engine error: {0}")]
    Engine(String),
}

/// Port wrapping the media negotiation engine
#[async_trait]
pub trait PeerConnectionAdapter: Send + Sync {
    fn capabilities(&self) -> PeerCapabilities;

    /// Build the underlying connection; events flow into `events` until `close`
    async fn initialize(&self, events: PeerEventSender) -> Result<(), PeerError>;

    /// Create and apply the local offer, returning its description
    async fn create_offer(&self) -> Result<String, PeerError>;

    async fn apply_answer(&self, sdp: &str) -> Result<(), PeerError>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError>;

    async fn close(&self);
}

/// Creates a fresh adapter for each session
pub trait PeerConnectionFactory: Send + Sync {
    fn create(&self) -> Arc<dyn PeerConnectionAdapter>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_negotiation() {
        let ok = PeerCapabilities {
            api_version: REQUIRED_PEER_API_VERSION,
            trickle_ice: true,
        };
        assert!(ok.negotiate().is_ok());

        let old = PeerCapabilities {
            api_version: 0,
            trickle_ice: true,
        };
        assert_eq!(
            old.negotiate(),
            Err(CapabilityError::IncompatibleVersion {
                found: 0,
                required: REQUIRED_PEER_API_VERSION
            })
        );

        let no_trickle = PeerCapabilities {
            api_version: REQUIRED_PEER_API_VERSION,
            trickle_ice: false,
        };
        assert_eq!(
            no_trickle.negotiate(),
            Err(CapabilityError::TrickleIceUnsupported)
        );
    }
}
