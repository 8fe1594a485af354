//! # Boot stage executables.
//!
//! Four ordered stages, each a function-backed [`Executable`] requiring the
//! runtime handle. A stage guards on the artifacts of its predecessors
//! (topology, node), so a failed stage makes its successors fail with a
//! recorded reason instead of acting on missing state.
//!
//! [`Executable`]: crate::Executable

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::error::ExecError;
use crate::exec::{ExecFn, ExecutableRef};
use crate::node::Node;
use crate::topology::Topology;

/// The four boot stages, in execution order.
#[must_use]
pub fn boot_stages() -> Vec<ExecutableRef> {
    vec![stage_0_config(), stage_1_topology(), stage_2_node(), stage_3_services()]
}

/// Stage 0: configuration validation.
fn stage_0_config() -> ExecutableRef {
    Box::new(
        ExecFn::new("stage_0_config", |ctx: crate::exec::ExecContext, _data| async move {
            let rt = ctx.require_runtime("stage_0_config")?;
            let config = rt.config();
            if config.node_name.is_empty() {
                return Err(ExecError::failed("node_name is empty"));
            }
            if config.bus_capacity == 0 {
                return Err(ExecError::failed("bus_capacity is zero"));
            }
            if config.collect_period.is_zero() {
                return Err(ExecError::failed("collect_period is zero"));
            }
            if !config.is_master && config.master_name().is_none() {
                return Err(ExecError::failed("worker node has no master name"));
            }
            info!(node = %config.node_name, uid = rt.uid(), "stage 0: configuration valid");
            Ok(json!(true))
        })
        .require_runtime(),
    )
}

/// Stage 1: topology loading.
fn stage_1_topology() -> ExecutableRef {
    Box::new(
        ExecFn::new("stage_1_topology", |ctx: crate::exec::ExecContext, _data| async move {
            let rt = ctx.require_runtime("stage_1_topology")?;
            let topology = Topology::load(&rt.config().topology)
                .map_err(|e| ExecError::failed(e.to_string()))?;
            let nodes = topology.nodes.len();
            info!(topology = %topology.name, nodes, "stage 1: topology loaded");
            rt.set_topology(topology);
            Ok(json!({ "nodes": nodes }))
        })
        .require_runtime(),
    )
}

/// Stage 2: node creation and bus loading.
fn stage_2_node() -> ExecutableRef {
    Box::new(
        ExecFn::new("stage_2_node", |ctx: crate::exec::ExecContext, _data| async move {
            let rt = ctx.require_runtime("stage_2_node")?;
            if rt.topology().is_none() {
                return Err(ExecError::failed("topology not loaded"));
            }
            let node = Arc::new(Node::new(
                Arc::clone(rt.config()),
                Arc::clone(rt.registry()),
            ));
            node.load_buses()
                .await
                .map_err(|e| ExecError::failed(e.to_string()))?;
            info!(node = node.name(), "stage 2: node buses loaded");
            rt.set_node(node);
            Ok(json!(true))
        })
        .require_runtime(),
    )
}

/// Stage 3: services and start.
fn stage_3_services() -> ExecutableRef {
    Box::new(
        ExecFn::new("stage_3_services", |ctx: crate::exec::ExecContext, _data| async move {
            let rt = ctx.require_runtime("stage_3_services")?;
            let Some(node) = rt.node() else {
                return Err(ExecError::failed("node not created"));
            };
            node.load_services()
                .await
                .map_err(|e| ExecError::failed(e.to_string()))?;
            node.start()
                .await
                .map_err(|e| ExecError::failed(e.to_string()))?;
            let registered = node
                .register_to_master()
                .map_err(|e| ExecError::failed(e.to_string()))?;
            info!(node = node.name(), registered, "stage 3: node serving");
            Ok(json!(true))
        })
        .require_runtime(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::exec::ExecContext;
    use crate::runtime::RuntimeContext;
    use crate::transaction::{Transaction, TxStatus, TxType};

    #[tokio::test]
    async fn test_stages_reject_a_context_without_runtime() {
        let mut tx = Transaction::new("runtime", "t", "staged_boot", boot_stages(), TxType::Sequence);
        let err = tx.prepare(&ExecContext::empty()).unwrap_err();
        assert_eq!(err.as_label(), "exec_invalid_context");
    }

    #[tokio::test]
    async fn test_failed_stage_fails_its_successors_with_reasons() {
        // Invalid topology: stage 0 passes, stage 1 fails, stages 2 and 3
        // fail on the missing artifacts of their predecessors. All four
        // settle and are recorded.
        let mut config = Config::default();
        config.topology = crate::config::TopologySource::Inline(serde_json::json!({
            "nodes": {
                "a": {"is_master": true},
                "b": {"is_master": true},
            }
        }));
        let rt = RuntimeContext::new(config);

        let mut tx = Transaction::new("runtime", "t", "staged_boot", boot_stages(), TxType::Sequence);
        tx.prepare(&ExecContext::new(rt.clone())).unwrap();
        assert!(!tx.execute(None).await);
        assert_eq!(tx.status(), TxStatus::ExecKo);
        assert_eq!(tx.results().len(), 4);
        assert!(!tx.results()[0].has_error);
        assert!(tx.results()[1].has_error);
        assert!(tx.results()[2].has_error);
        assert!(tx.results()[3].has_error);
        assert!(rt.node().is_none());
    }
}
