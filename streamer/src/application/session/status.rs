use shared::StatsPayload;
use std::time::Duration;

use crate::domain::{SessionId, SessionOptions, SessionState};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Settings injected into the orchestrator at construction
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// Upper bound for closing each leg during teardown
    pub teardown_timeout: Duration,
    pub app_version: String,
    pub client_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            client_name: "hts-streamer".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartSessionRequest {
    pub host: String,
    pub port: u16,
    pub options: SessionOptions,
}

/// Observer-facing snapshot, published on every change
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub session_id: Option<SessionId>,
    /// Last fatal reason; kept until the next start
    pub last_error: Option<String>,
    pub last_stats: Option<StatsPayload>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            session_id: None,
            last_error: None,
            last_stats: None,
        }
    }
}
