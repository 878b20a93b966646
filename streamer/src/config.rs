//! Layered settings: built-in defaults, an optional `hts-streamer.toml`,
//! then `HTS__SECTION__KEY` environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::application::session::status::{
    SessionConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_TEARDOWN_TIMEOUT,
};
use crate::infrastructure::driven::peer::PeerSettings;
use crate::infrastructure::driven::signaling::SignalingTransport;
use crate::infrastructure::driven::telemetry::{ListenMode, ListenerConfig, TelemetryProtocol};

pub const DEFAULT_CONFIG_FILE: &str = "hts-streamer";
const ENV_PREFIX: &str = "HTS";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SignalingSettings {
    pub transport: SignalingTransport,
    pub connect_timeout_ms: u64,
    pub teardown_timeout_ms: u64,
}

impl Default for SignalingSettings {
    fn default() -> Self {
        Self {
            transport: SignalingTransport::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            teardown_timeout_ms: DEFAULT_TEARDOWN_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub app_version: String,
    pub client_name: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            client_name: "hts-streamer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PeerSection {
    pub ice_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub protocol: TelemetryProtocol,
    /// Falls back to the protocol's default when unset
    pub host: Option<String>,
    pub port: Option<u16>,
    pub report_interval_ms: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            protocol: TelemetryProtocol::default(),
            host: None,
            port: None,
            report_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub signaling: SignalingSettings,
    pub client: ClientSettings,
    pub peer: PeerSection,
    pub telemetry: TelemetrySettings,
}

impl Settings {
    /// Load from `file` (or `hts-streamer.{toml,...}` in the working
    /// directory) and the environment. A missing file is not an error.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Config::builder()
            .add_source(file_source)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("peer.ice_servers")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Self>()?
            .validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.telemetry.report_interval_ms == 0 {
            return Err(ConfigError::Message(
                "telemetry.report_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(self.signaling.connect_timeout_ms),
            teardown_timeout: Duration::from_millis(self.signaling.teardown_timeout_ms),
            app_version: self.client.app_version.clone(),
            client_name: self.client.client_name.clone(),
        }
    }

    pub fn peer_settings(&self, test_pattern: bool) -> PeerSettings {
        PeerSettings {
            ice_servers: self.peer.ice_servers.clone(),
            test_pattern,
        }
    }

    /// Listener settings for `protocol` (or the configured one); host and
    /// port fall back to that protocol's defaults when unset
    pub fn listener_config(
        &self,
        protocol: Option<TelemetryProtocol>,
        mode: ListenMode,
        handshake: bool,
    ) -> ListenerConfig {
        let protocol = protocol.unwrap_or(self.telemetry.protocol);
        ListenerConfig {
            protocol,
            host: self
                .telemetry
                .host
                .clone()
                .unwrap_or_else(|| protocol.default_host().to_string()),
            port: self.telemetry.port.unwrap_or_else(|| protocol.default_port()),
            mode,
            report_interval: Duration::from_millis(self.telemetry.report_interval_ms),
            handshake,
        }
    }
}
