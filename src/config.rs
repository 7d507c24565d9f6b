//! Receiver configuration.

use crate::error::{Error, Result};
use crate::peer::ice::{default_ice_servers, validate_ice_servers};
use crate::peer::types::ServerConfig;
use crate::utils::signaling_endpoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Path suffix of the relay's signaling endpoint.
pub const SIGNALING_PATH: &str = "/signaling";

/// Delay between a control-channel close and the next dial.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Longest a single dial (TCP connect plus WebSocket upgrade) may take.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_millis(10_000);

pub const DEFAULT_BASE_URL: &str = "ws://localhost:8000";

/// Everything a receiver needs to find the relay and reach the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Relay base url; `/signaling` is appended.
    pub base_url: String,

    /// Fixed reconnect delay in milliseconds.
    pub reconnect_delay_ms: u64,

    /// A dial still pending after this many milliseconds counts as failed.
    pub dial_timeout_ms: u64,

    /// STUN/TURN servers handed to every new peer connection.
    pub ice_servers: Vec<ServerConfig>,

    /// Where the CLI writes the most recent frame, if anywhere.
    pub frame_output: Option<PathBuf>,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
            dial_timeout_ms: DEFAULT_DIAL_TIMEOUT.as_millis() as u64,
            ice_servers: default_ice_servers(),
            frame_output: None,
        }
    }
}

impl ReceiverConfig {
    /// Reads a TOML config file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn with_ice_servers(mut self, servers: Vec<ServerConfig>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn signaling_url(&self) -> Result<Url> {
        signaling_endpoint(&self.base_url)
    }

    /// Checks that the config can actually drive a receiver.
    pub fn validate(&self) -> Result<()> {
        self.signaling_url()?;
        if self.reconnect_delay_ms == 0 {
            return Err(Error::Config(
                "reconnect_delay_ms must be greater than zero".into(),
            ));
        }
        if self.dial_timeout_ms == 0 {
            return Err(Error::Config("dial_timeout_ms must be greater than zero".into()));
        }
        validate_ice_servers(&self.ice_servers)
    }
}
