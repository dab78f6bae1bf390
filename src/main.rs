//! glm-usage - headless CLI for the GLM usage monitor
//!
//! Run with: cargo run --bin glm-usage [-- --watch]
//!
//! One-shot by default: forces a refresh, prints the snapshot as pretty JSON
//! and exits non-zero if the snapshot carries an error. With `--watch` the
//! coordinator runs on its 60-second timer and each new snapshot is printed
//! as one compact JSON line until Ctrl-C.
//!
//! Settings come from the `GLM_USAGE_*` environment variables; the bearer
//! token falls back to `ANTHROPIC_AUTH_TOKEN`. Logging is controlled by
//! `RUST_LOG`.

use std::sync::Arc;

use glm_usage_monitor::{EnvSettings, RefreshCoordinator, SnapshotConsumer, UsageSnapshot};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("Usage: glm-usage [--watch]");
        println!("  (default)   fetch once, print the snapshot as pretty JSON");
        println!("  --watch     keep refreshing every 60s, one JSON line per snapshot");
        return;
    }

    let coordinator = RefreshCoordinator::new(Arc::new(EnvSettings));

    if args.iter().any(|a| a == "--watch") {
        watch(coordinator).await;
    } else {
        coordinator.refresh(true).await;
        match coordinator.current() {
            Some(snapshot) => {
                println!("{}", serde_json::to_string_pretty(snapshot.as_ref()).unwrap());
                if !snapshot.is_ok() {
                    std::process::exit(1);
                }
            }
            None => {
                eprintln!("No snapshot produced");
                std::process::exit(1);
            }
        }
    }
}

/// Prints each settled snapshot as one compact JSON line
struct JsonLinePrinter;

impl SnapshotConsumer for JsonLinePrinter {
    fn on_snapshot_updated(&self, snapshot: &UsageSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("Failed to serialize snapshot: {}", e),
        }
    }
}

async fn watch(coordinator: RefreshCoordinator) {
    coordinator.subscribe(Arc::new(JsonLinePrinter));
    coordinator.start();

    if tokio::signal::ctrl_c().await.is_ok() {
        coordinator.stop();
    }
}
