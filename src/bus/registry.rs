//! # Engine registry: package name to engine factory.
//!
//! Replaces runtime module loading with a compile-time map of factories.
//! Built-ins cover the `"default"` stream engine and the `"socket"` TCP
//! engine; custom engines register under their own package name before the
//! bus features load.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::bus::{BusEngine, SocketBusEngine, StreamBusEngine};
use crate::config::BusEngineConfig;
use crate::error::BusError;

/// Builds an engine from its bus unique name and configuration section.
pub type EngineFactory =
    Arc<dyn Fn(&str, &BusEngineConfig, usize) -> Arc<dyn BusEngine> + Send + Sync>;

/// Named factory map for bus engines.
pub struct EngineRegistry {
    factories: RwLock<HashMap<String, EngineFactory>>,
}

impl EngineRegistry {
    /// Creates a registry with the built-in `"default"` and `"socket"`
    /// packages pre-registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
        };
        registry.register("default", |name, _cfg, capacity| {
            Arc::new(StreamBusEngine::new(name, capacity))
        });
        registry.register("socket", |name, cfg, capacity| {
            let host = cfg.host.as_deref().unwrap_or("localhost");
            let port = cfg.port.unwrap_or(5000);
            Arc::new(SocketBusEngine::new(
                name,
                cfg.kind,
                format!("{host}:{port}"),
                capacity,
            ))
        });
        registry
    }

    /// Registers (or replaces) a factory under a package name.
    pub fn register<F>(&self, package: impl Into<String>, factory: F)
    where
        F: Fn(&str, &BusEngineConfig, usize) -> Arc<dyn BusEngine> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(|p| p.into_inner());
        factories.insert(package.into(), Arc::new(factory));
    }

    /// Resolves a package and builds an engine instance.
    ///
    /// Unknown packages fail with [`BusError::EngineResolution`]; the bus
    /// feature treats that as fatal for itself, not for the process.
    pub fn resolve(
        &self,
        name: &str,
        cfg: &BusEngineConfig,
        capacity: usize,
    ) -> Result<Arc<dyn BusEngine>, BusError> {
        let factory = {
            let factories = self.factories.read().unwrap_or_else(|p| p.into_inner());
            factories.get(&cfg.package).cloned()
        };
        match factory {
            Some(factory) => Ok(factory(name, cfg, capacity)),
            None => Err(BusError::EngineResolution {
                package: cfg.package.clone(),
            }),
        }
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_package_resolves_stream_engine() {
        let registry = EngineRegistry::with_builtins();
        let engine = registry
            .resolve("node_a_msg_bus", &BusEngineConfig::default(), 8)
            .unwrap();
        assert_eq!(engine.name(), "node_a_msg_bus");
    }

    #[test]
    fn test_unknown_package_fails_resolution() {
        let registry = EngineRegistry::with_builtins();
        let cfg = BusEngineConfig {
            package: "simplebus".into(),
            ..BusEngineConfig::default()
        };
        let err = registry.resolve("node_a_msg_bus", &cfg, 8).unwrap_err();
        assert!(matches!(
            err,
            BusError::EngineResolution { ref package } if package == "simplebus"
        ));
    }

    #[test]
    fn test_custom_registration_resolves() {
        let registry = EngineRegistry::with_builtins();
        registry.register("custom", |name, _cfg, capacity| {
            Arc::new(StreamBusEngine::new(format!("{name}_custom"), capacity))
        });
        let cfg = BusEngineConfig {
            package: "custom".into(),
            ..BusEngineConfig::default()
        };
        let engine = registry.resolve("b", &cfg, 8).unwrap();
        assert_eq!(engine.name(), "b_custom");
    }
}
