//! Multi-node simulation harness.
//!
//! Runs the FLOC core against a simulated acoustic medium so flooding,
//! deduplication, retries and ranging can be observed without hardware.
//! One Embassy task per node drives the periodic tick; a single medium task
//! models propagation between them.
//!
//! ## Module Organization
//!
//! - `types`: channel typedefs and harness constants
//! - `modem`: the in-process `ModemDriver` implementation
//! - `node_task`: per-node tick loop and application glue
//! - `network`: the medium task and scenario bring-up

pub mod modem;
pub mod network;
pub mod node_task;
pub mod types;

pub use network::spawn_network;
pub use types::MAX_NODE_COUNT;
