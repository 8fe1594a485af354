//! # Bus feature.
//!
//! Resolves an engine for one bus and publishes the resulting
//! [`MessageBus`](crate::MessageBus) into the node context. The bus unique
//! name is `<node_name>_<feature_name>`, so every endpoint in a topology is
//! addressable.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::node::{NodeContext, NodeFeature};

/// Loads one named bus with its channels.
pub struct BusFeature {
    name: String,
    channels: Vec<String>,
}

impl BusFeature {
    /// ### Parameters
    /// - `name`: feature name (`msg_bus`, `metrics_bus`, `logs_bus`).
    /// - `channels`: channels registered on the bus at load.
    #[must_use]
    pub fn new(name: impl Into<String>, channels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            channels,
        }
    }

    /// Bus unique name for a node/feature pair.
    #[must_use]
    pub fn unique_name(node_name: &str, feature_name: &str) -> String {
        format!("{node_name}_{feature_name}")
    }
}

#[async_trait]
impl NodeFeature for BusFeature {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self, ctx: &NodeContext) -> Result<(), RuntimeError> {
        if ctx.bus(&self.name).is_some() {
            debug!(feature = %self.name, "bus already loaded");
            return Ok(());
        }

        let unique = Self::unique_name(ctx.node_name(), &self.name);
        let cfg = ctx.config().bus(&self.name);
        let engine = ctx
            .registry()
            .resolve(&unique, &cfg, ctx.config().bus_capacity)
            .map_err(|error| RuntimeError::BusUnavailable {
                feature: self.name.clone(),
                bus: format!("{unique} ({error})"),
            })?;

        let bus = crate::bus::MessageBus::new(unique.clone(), engine);
        for channel in &self.channels {
            bus.channel_add(channel);
        }
        ctx.insert_bus(&self.name, bus);
        info!(feature = %self.name, bus = %unique, package = %cfg.package, "bus loaded");
        Ok(())
    }

    async fn stop(&self, ctx: &NodeContext) -> Result<(), RuntimeError> {
        if let Some(bus) = ctx.bus(&self.name) {
            bus.close();
        }
        Ok(())
    }
}
