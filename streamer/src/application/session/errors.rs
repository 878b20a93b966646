use thiserror::Error;

use crate::domain::SessionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a session is already active (state: {0})")]
    AlreadyActive(SessionState),
    #[error("invalid session request: {0}")]
    InvalidRequest(String),
    #[error("signaling connect failed: {0}")]
    ConnectFailed(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("peer connection failure: {0}")]
    Adapter(String),
    #[error("signaling channel closed: {0}")]
    TransportDropped(String),
    #[error("host error: {0}")]
    HostError(String),
    #[error("session orchestrator is not running")]
    OrchestratorClosed,
}
