use std::time::Duration;

use serde::Deserialize;
use polykern_core::error::{PolykernError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub version: u32,

    pub node: NodeSection,

    #[serde(default)]
    pub control_plane: ControlPlaneSection,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub exchanges: ExchangeSection,

    #[serde(default)]
    pub routing: RoutingSection,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PolykernError::InvalidConfig(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.node.validate()?;
        self.control_plane.validate()?;
        self.reconnect.validate()?;
        self.exchanges.validate()?;

        Ok(())
    }
}

/// Identity announced to the control plane.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSection {
    pub id: String,
    #[serde(default = "default_cluster")]
    pub cluster: String,
}

impl NodeSection {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PolykernError::InvalidConfig("node.id must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlPlaneSection {
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ControlPlaneSection {
    fn default() -> Self {
        Self {
            address: default_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ControlPlaneSection {
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(PolykernError::InvalidConfig(
                "control_plane.address must not be empty".into(),
            ));
        }
        if !(100..=60_000).contains(&self.connect_timeout_ms) {
            return Err(PolykernError::InvalidConfig(
                "control_plane.connect_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if !(100..=60_000).contains(&self.request_timeout_ms) {
            return Err(PolykernError::InvalidConfig(
                "control_plane.request_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if self.max_frame_bytes < 1024 {
            return Err(PolykernError::InvalidConfig(
                "control_plane.max_frame_bytes must be at least 1024".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectSection {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectSection {
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms == 0 {
            return Err(PolykernError::InvalidConfig(
                "reconnect.initial_delay_ms must be greater than 0".into(),
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(PolykernError::InvalidConfig(
                "reconnect.max_delay_ms must be >= initial_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeSection {
    /// A stored exchange older than this is dropped by the sweeper.
    #[serde(default = "default_exchange_ttl_ms")]
    pub ttl_ms: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for ExchangeSection {
    fn default() -> Self {
        Self {
            ttl_ms: default_exchange_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl ExchangeSection {
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_ms == 0 {
            return Err(PolykernError::InvalidConfig(
                "exchanges.sweep_interval_ms must be greater than 0".into(),
            ));
        }
        if self.ttl_ms < self.sweep_interval_ms {
            return Err(PolykernError::InvalidConfig(
                "exchanges.ttl_ms must be >= sweep_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

/// What the executor does for a route with no installed chain.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteMissBehavior {
    #[default]
    PassThrough,
    Reject,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingSection {
    #[serde(default)]
    pub on_route_miss: RouteMissBehavior,
}

fn default_cluster() -> String {
    "default".into()
}
fn default_address() -> String {
    "127.0.0.1:18000".into()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_request_timeout_ms() -> u64 {
    5000
}
fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_exchange_ttl_ms() -> u64 {
    60_000
}
fn default_sweep_interval_ms() -> u64 {
    5000
}
