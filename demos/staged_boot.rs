//! # Demo: Staged Boot
//!
//! Boots a master node from an inline topology, publishes a log record
//! through the logs feature, then queries the metrics server state.

use std::time::Duration;

use serde_json::json;
use txvisor::{Config, Runtime, TopologySource};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut cfg = Config::default();
    cfg.node_name = "master".into();
    cfg.is_master = true;
    cfg.collect_period = Duration::from_secs(2);
    cfg.topology = TopologySource::Inline(json!({
        "name": "demo_world",
        "nodes": {
            "master": { "host": "localhost", "is_master": true },
        },
    }));

    let runtime = Runtime::new(cfg);
    if !runtime.load().await {
        println!("boot failed, see log output above");
        return;
    }

    let node = match runtime.node() {
        Some(node) => node,
        None => return,
    };
    println!("node [{}] serving", node.name());

    if let Err(error) = node
        .logs()
        .publish_log(node.context(), "info", "demo", vec!["hello from the demo".into()])
    {
        println!("log publish failed: {error}");
    }

    // Let the collectors run a couple of sampling periods.
    tokio::time::sleep(Duration::from_secs(5)).await;

    let server = node.metrics().server();
    for kind in ["bus", "host", "process"] {
        println!("{kind} subjects: {:?}", server.state_items(kind));
    }

    runtime.stop().await;
    println!("stopped");
}
