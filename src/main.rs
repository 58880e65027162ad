//! # FLOC Node - Main Entry Point
//!
//! Runs a scenario of simulated FLOC nodes: each one floods received packets
//! onward at most once, prioritizes outbound traffic across three bounded
//! queues, retries commands until acknowledged, and runs short ranging
//! rounds against selected neighbors.
//!
//! The binary loads a scenario file (path as the first argument) and runs it
//! on an Embassy executor until interrupted. Per-node log lines carry a
//! `[device_id]` prefix so interleaved output stays attributable.

use embassy_executor::Executor;
use env_logger::Builder;
use log::{LevelFilter, info};
use std::path::Path;

use floc_node::{config, simulation};

/// Scenario used when no path is given on the command line.
const DEFAULT_SCENARIO: &str = "scenes/basic.toml";

fn main() -> anyhow::Result<()> {
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("floc_node"), LevelFilter::Debug)
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
    let scenario = config::Scenario::load(Path::new(&path))?;

    info!(
        "Starting {} nodes on network {:#06x} (scenario {path})",
        scenario.nodes.len(),
        scenario.network_id
    );

    // INTENTIONAL LEAK: the executor needs a 'static lifetime and runs for
    // the entire process.
    let executor: &'static mut Executor = Box::leak(Box::new(Executor::new()));
    executor.run(|spawner| simulation::spawn_network(spawner, scenario))
}
