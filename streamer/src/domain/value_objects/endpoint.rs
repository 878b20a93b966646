use serde::{Deserialize, Serialize};
use std::fmt;

/// Signaling host address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, String> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err("Host must not be empty".to_string());
        }
        if host.chars().any(char::is_whitespace) {
            return Err("Host must not contain whitespace".to_string());
        }
        if port == 0 {
            return Err("Port must be between 1 and 65535".to_string());
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
