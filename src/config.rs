//! Gateway configuration.
//!
//! One listener entry per bound socket, referring to a registered protocol
//! by name. Fields carry serde defaults so a minimal entry is just a
//! protocol and a port.

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::framing::ByteOrder;

/// Listener transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Udp,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

/// One socket to bind and the protocol served on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Registered protocol name, e.g. "gt06".
    pub protocol: String,
    #[serde(default = "default_address")]
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    /// Byte order for length-field framing policies.
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Accept frames wrapped in HTTP requests. Recognized but unsupported;
    /// binding such a listener fails.
    #[serde(default)]
    pub http_tunnel: bool,
}

impl ListenerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
}

impl GatewayConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(GatewayError::from)
    }
}
