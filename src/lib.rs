//! # txvisor
//!
//! **Txvisor** is a transaction-oriented node runtime: it boots a node
//! through staged, commit/rollback transactions and wires its features
//! together over message buses, with a metrics pipeline folding per-node
//! samples into aggregated state.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!          ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//!          │  Executable  │  │  Executable  │  │  Executable  │
//!          │  (stage 0)   │  │  (stage …)   │  │  (stage 3)   │
//!          └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!                 ▼                 ▼                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Transaction (SEQUENCE / EVERY / ONE)                           │
//! │  - prepare() fans the ExecContext out to every step             │
//! │  - execute() settles steps, records StepResults                 │
//! │  - commit (exec_ack) or rollback (exec_fail) on every step      │
//! └──────────────────────────────┬──────────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Node                                                           │
//! │  ├─ msg_bus ───────── channel "msg"      (node actions)         │
//! │  ├─ metrics_bus ───── channel "metrics"  (metrics records)      │
//! │  ├─ logs_bus ──────── channel "logs"     (log records)          │
//! │  ├─ MetricsFeature: collectors (bus/host/process/http)          │
//! │  │                   + MetricsServer (validating reducer)       │
//! │  └─ LogsFeature:     LogsServer (validating re-emitter)         │
//! └─────────────────────────────────────────────────────────────────┘
//!
//! Bus engines: StreamBusEngine (in-process broadcast, "default")
//!              SocketBusEngine (TCP JSON-lines, "socket")
//!              custom packages via EngineRegistry
//! ```
//!
//! ### Metrics flow
//! ```text
//! live counters ──► Record.iteration() ──► publish {metric, values[]}
//!                                               │
//!                            MetricsServer ◄────┘ (self-suppressing)
//!                                 │ validate + dispatch by kind
//!                                 ▼
//!                     Collector.reduce() ──► MetricsState (per subject)
//! ```
//!
//! ## Features
//! | Area             | Description                                              | Key types / traits                       |
//! |------------------|----------------------------------------------------------|------------------------------------------|
//! | **Transactions** | Grouped execution with commit/rollback and step results. | [`Transaction`], [`TxType`]              |
//! | **Executables**  | Async units of work with prepare/execute lifecycle.      | [`Executable`], [`ExecFn`]               |
//! | **Buses**        | Channel-based pub/sub with pluggable engines.            | [`MessageBus`], [`BusEngine`], [`Receive`]|
//! | **Metrics**      | Periodic sampling, bus distribution, state reduction.    | [`Collector`], [`MetricsRecord`]         |
//! | **Servers**      | Validating bus receivers for metrics and logs.           | [`MetricsServer`], [`LogsServer`]        |
//! | **Runtime**      | Four-stage boot as a SEQUENCE transaction.               | [`Runtime`], [`RuntimeContext`]          |
//! | **Errors**       | Typed errors per layer.                                  | [`ExecError`], [`BusError`], [`RuntimeError`] |
//!
//! ## Example
//! ```rust
//! use serde_json::json;
//! use txvisor::{Config, Runtime, TopologySource};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut cfg = Config::default();
//!     cfg.node_name = "master".into();
//!     cfg.is_master = true;
//!     cfg.topology = TopologySource::Inline(json!({
//!         "name": "world",
//!         "nodes": { "master": { "host": "localhost", "is_master": true } },
//!     }));
//!
//!     let runtime = Runtime::new(cfg);
//!     assert!(runtime.load().await);
//!
//!     let node = runtime.node().expect("node serving");
//!     assert_eq!(node.name(), "master");
//!
//!     runtime.stop().await;
//! }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod exec;
pub mod metrics;
pub mod node;
pub mod runtime;
pub mod server;
pub mod topology;
pub mod transaction;

// ---- Public re-exports ----

pub use bus::{
    BusCounters, BusEngine, BusMessage, CountersSnapshot, EngineRegistry, MessageBus, Receive,
    SocketBusEngine, StreamBusEngine,
};
pub use config::{BusEngineConfig, Config, EngineKind, MasterConfig, TopologySource};
pub use error::{BusError, ExecError, RuntimeError};
pub use exec::{unimplemented_exec, ExecContext, ExecFn, ExecStatus, Executable, ExecutableRef};
pub use metrics::{Collector, CollectorTimer, DurationMetric, MetricsRecord, MetricsState};
pub use node::{BusFeature, LogsFeature, MetricsFeature, Node, NodeContext, NodeFeature, NodeState};
pub use runtime::{Runtime, RuntimeContext};
pub use server::{LogsServer, MetricsServer};
pub use topology::{Topology, TopologyNode};
pub use transaction::{is_truthy, StepResult, Transaction, TxStatus, TxType};
