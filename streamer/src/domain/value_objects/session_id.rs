use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-attempt session token, used to discard stray messages from superseded sessions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an inbound envelope's `session_id` belongs to this session
    pub fn matches(&self, candidate: &str) -> bool {
        !candidate.is_empty() && self.0 == candidate
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
