//! # Global runtime configuration.
//!
//! [`Config`] defines the node runtime's behavior: node identity, master
//! addressing, per-bus engine selection, bus channel capacity, metrics
//! collection period, and the topology document source.
//!
//! Bus engine sections follow the external configuration shape consumed by
//! the bus features:
//!
//! ```json
//! { "package": "default", "type": "Server", "protocol": "http",
//!   "host": "localhost", "port": 5000, "settings": {} }
//! ```
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use txvisor::{Config, EngineKind};
//!
//! let mut cfg = Config::default();
//! cfg.node_name = "node_a".into();
//! cfg.collect_period = Duration::from_secs(60);
//!
//! let msg_bus = cfg.bus("msg_bus");
//! assert_eq!(msg_bus.package, "default");
//! assert_eq!(msg_bus.kind, EngineKind::Server);
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a socket-based bus engine endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    /// Listening endpoint (master side).
    Server,
    /// Connecting endpoint (worker side).
    Client,
}

/// Engine selection and transport settings for one bus.
///
/// `package` picks the engine implementation in the
/// [`EngineRegistry`](crate::EngineRegistry): `"default"` is the in-process
/// stream engine, `"socket"` the TCP engine; custom names resolve against
/// user registrations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusEngineConfig {
    /// Engine package name resolved by the registry.
    #[serde(default = "default_package")]
    pub package: String,
    /// Server or Client role (socket engines only).
    #[serde(rename = "type", default = "default_kind")]
    pub kind: EngineKind,
    /// Transport protocol hint (`"http"` / `"https"`).
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Peer or bind host (socket engines only).
    #[serde(default)]
    pub host: Option<String>,
    /// Peer or bind port (socket engines only).
    #[serde(default)]
    pub port: Option<u16>,
    /// Engine-specific settings, passed through opaque.
    #[serde(default)]
    pub settings: Value,
}

fn default_package() -> String {
    "default".into()
}

fn default_kind() -> EngineKind {
    EngineKind::Server
}

fn default_protocol() -> String {
    "http".into()
}

impl Default for BusEngineConfig {
    fn default() -> Self {
        Self {
            package: default_package(),
            kind: default_kind(),
            protocol: default_protocol(),
            host: None,
            port: None,
            settings: Value::Null,
        }
    }
}

/// Master node addressing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Master node name (`None` on the master itself until boot seeds it).
    pub name: Option<String>,
    /// Master host.
    pub host: String,
    /// Master base port.
    pub port: u16,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            name: None,
            host: "localhost".into(),
            port: 5000,
        }
    }
}

/// Where stage 1 reads the topology document from.
#[derive(Clone, Debug)]
pub enum TopologySource {
    /// Topology JSON embedded in the configuration.
    Inline(Value),
    /// Topology JSON read from a local file (the original `apps/world.json`).
    File(PathBuf),
}

impl Default for TopologySource {
    fn default() -> Self {
        TopologySource::Inline(Value::Object(serde_json::Map::new()))
    }
}

/// Global configuration for the node runtime.
///
/// Controls node identity, mastership, bus engine selection, and the metrics
/// collection schedule.
#[derive(Clone, Debug)]
pub struct Config {
    /// Node name; also the prefix of every bus unique name.
    pub node_name: String,
    /// Whether this node is the master of its topology.
    pub is_master: bool,
    /// Master addressing (used by `Client` engines and node registration).
    pub master: MasterConfig,
    /// Capacity of each bus channel (broadcast ring buffer).
    pub bus_capacity: usize,
    /// Period between two metrics collector samples.
    pub collect_period: Duration,
    /// Per-bus engine configuration, keyed by feature name
    /// (`msg_bus`, `metrics_bus`, `logs_bus`).
    pub buses: HashMap<String, BusEngineConfig>,
    /// Topology document source consumed by boot stage 1.
    pub topology: TopologySource,
}

impl Config {
    /// Returns the engine configuration for a bus feature, falling back to
    /// the default stream engine when the feature has no dedicated section.
    pub fn bus(&self, feature: &str) -> BusEngineConfig {
        self.buses.get(feature).cloned().unwrap_or_default()
    }

    /// Effective master name: the node itself when master, else the
    /// configured master name.
    pub fn master_name(&self) -> Option<String> {
        if self.is_master {
            Some(self.node_name.clone())
        } else {
            self.master.name.clone()
        }
    }
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `node_name = "node"`, `is_master = true`
    /// - `bus_capacity = 256`
    /// - `collect_period = 300s`
    /// - all buses on the `default` stream engine
    /// - empty inline topology
    fn default() -> Self {
        Self {
            node_name: "node".into(),
            is_master: true,
            master: MasterConfig::default(),
            bus_capacity: 256,
            collect_period: Duration::from_secs(300),
            buses: HashMap::new(),
            topology: TopologySource::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_falls_back_to_default_engine() {
        let cfg = Config::default();
        let bus = cfg.bus("metrics_bus");
        assert_eq!(bus.package, "default");
        assert!(bus.host.is_none());
    }

    #[test]
    fn test_master_name_on_master_is_node_name() {
        let mut cfg = Config::default();
        cfg.node_name = "alpha".into();
        cfg.is_master = true;
        assert_eq!(cfg.master_name().as_deref(), Some("alpha"));
    }

    #[test]
    fn test_engine_config_deserializes_wire_shape() {
        let cfg: BusEngineConfig = serde_json::from_value(serde_json::json!({
            "package": "socket",
            "type": "Client",
            "protocol": "http",
            "host": "master.local",
            "port": 5000,
            "settings": {}
        }))
        .expect("valid engine config");
        assert_eq!(cfg.package, "socket");
        assert_eq!(cfg.kind, EngineKind::Client);
        assert_eq!(cfg.port, Some(5000));
    }
}
