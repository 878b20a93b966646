use async_trait::async_trait;
use shared::Envelope;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::Endpoint;

/// Notifications produced by a signaling channel, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    Connected,
    /// One fully decoded inbound message
    Envelope(Envelope),
    Disconnected(String),
    /// Transport-level problem (malformed frame, I/O failure)
    Error(String),
}

pub type SignalingEventSender = mpsc::UnboundedSender<SignalingEvent>;

#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("connect to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },
    #[error("connect to {endpoint} failed: {reason}")]
    ConnectFailed { endpoint: String, reason: String },
    #[error("signaling channel is already connected")]
    AlreadyConnected,
}

/// Port for the full-duplex, ordered signaling connection
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Establish the connection within `timeout`. On failure nothing is left open.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
        events: SignalingEventSender,
    ) -> Result<(), SignalingError>;

    /// Fire-and-forget write; a no-op when not connected
    fn send(&self, envelope: &Envelope);

    /// Best-effort graceful close, then release everything. Safe to repeat.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Creates a fresh channel for each session
pub trait SignalingChannelFactory: Send + Sync {
    fn create(&self) -> Arc<dyn SignalingChannel>;
}
