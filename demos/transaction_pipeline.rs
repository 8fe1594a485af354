//! # Demo: Transaction Pipeline
//!
//! Runs the same three steps under each strategy and prints the recorded
//! step results.

use serde_json::json;
use txvisor::{ExecContext, ExecFn, ExecutableRef, Transaction, TxType};

fn steps() -> Vec<ExecutableRef> {
    vec![
        ExecFn::boxed("fetch", |_ctx, _data| async {
            Ok(json!({"rows": 3}))
        }),
        ExecFn::boxed("validate", |_ctx, _data| async {
            Ok(json!(true))
        }),
        ExecFn::boxed("apply", |_ctx, _data| async {
            Ok(json!("applied"))
        }),
    ]
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt().init();

    for tx_type in [TxType::Sequence, TxType::Every, TxType::One] {
        let mut tx = Transaction::new("demo", "pipeline", tx_type.as_str(), steps(), tx_type);
        if tx.prepare(&ExecContext::empty()).is_err() {
            continue;
        }
        let ok = tx.execute(None).await;

        println!("{} -> committed: {ok}", tx.id());
        for step in tx.results() {
            println!(
                "  step {}: error={} result={:?}",
                step.index, step.has_error, step.result
            );
        }
    }
}
