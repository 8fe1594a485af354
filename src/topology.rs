//! # Topology document.
//!
//! The topology describes every node of a deployment and which one is the
//! master. It is plain JSON, read inline from the configuration or from a
//! file, and parsed/validated by boot stage 1.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TopologySource;
use crate::error::RuntimeError;

/// One node entry of the topology.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TopologyNode {
    /// Host the node runs on.
    #[serde(default)]
    pub host: Option<String>,
    /// Base port of the node's socket buses.
    #[serde(default)]
    pub port: Option<u16>,
    /// Whether this node is the topology master.
    #[serde(default)]
    pub is_master: bool,
    /// Node-specific settings, passed through opaque.
    #[serde(default)]
    pub settings: Value,
}

/// Parsed and validated topology document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Topology {
    /// Topology name.
    #[serde(default)]
    pub name: String,
    /// Node entries keyed by node name.
    #[serde(default)]
    pub nodes: HashMap<String, TopologyNode>,
    /// Application declarations, passed through opaque.
    #[serde(default)]
    pub applications: HashMap<String, Value>,
}

impl Topology {
    /// Parses a topology from a JSON value.
    pub fn from_value(value: Value) -> Result<Self, RuntimeError> {
        let topology: Topology =
            serde_json::from_value(value).map_err(|e| RuntimeError::TopologyInvalid {
                reason: e.to_string(),
            })?;
        topology.validate()?;
        Ok(topology)
    }

    /// Reads and parses a topology from its configured source.
    pub fn load(source: &TopologySource) -> Result<Self, RuntimeError> {
        match source {
            TopologySource::Inline(value) => Self::from_value(value.clone()),
            TopologySource::File(path) => {
                let raw =
                    std::fs::read_to_string(path).map_err(|e| RuntimeError::TopologyInvalid {
                        reason: format!("read [{}]: {e}", path.display()),
                    })?;
                let value =
                    serde_json::from_str(&raw).map_err(|e| RuntimeError::TopologyInvalid {
                        reason: format!("parse [{}]: {e}", path.display()),
                    })?;
                Self::from_value(value)
            }
        }
    }

    /// A topology may declare at most one master.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        let masters: Vec<&String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.is_master)
            .map(|(name, _)| name)
            .collect();
        if masters.len() > 1 {
            return Err(RuntimeError::TopologyInvalid {
                reason: format!("multiple masters declared: {masters:?}"),
            });
        }
        Ok(())
    }

    /// Looks up a node entry by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&TopologyNode> {
        self.nodes.get(name)
    }

    /// The master entry, if one is declared.
    #[must_use]
    pub fn master(&self) -> Option<(&String, &TopologyNode)> {
        self.nodes.iter().find(|(_, node)| node.is_master)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_node_doc() -> Value {
        json!({
            "name": "world",
            "nodes": {
                "master": {"host": "localhost", "port": 5000, "is_master": true},
                "worker": {"host": "localhost", "port": 5010},
            },
            "applications": {"rest_api": {"services": ["metrics"]}},
        })
    }

    #[test]
    fn test_parses_nodes_and_master() {
        let topology = Topology::from_value(two_node_doc()).unwrap();
        assert_eq!(topology.nodes.len(), 2);
        let (name, node) = topology.master().unwrap();
        assert_eq!(name, "master");
        assert_eq!(node.port, Some(5000));
        assert!(!topology.node("worker").unwrap().is_master);
    }

    #[test]
    fn test_two_masters_are_rejected() {
        let err = Topology::from_value(json!({
            "nodes": {
                "a": {"is_master": true},
                "b": {"is_master": true},
            }
        }))
        .unwrap_err();
        assert!(matches!(err, RuntimeError::TopologyInvalid { .. }));
    }

    #[test]
    fn test_empty_document_is_valid() {
        let topology = Topology::from_value(json!({})).unwrap();
        assert!(topology.master().is_none());
    }

    #[test]
    fn test_missing_file_is_a_topology_error() {
        let err = Topology::load(&TopologySource::File("/nonexistent/world.json".into()))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::TopologyInvalid { .. }));
    }
}
