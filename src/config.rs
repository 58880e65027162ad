//! Scenario configuration loading for the simulation harness.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

use crate::node::buffer::PING_ROSTER_SIZE;
use crate::protocol::types::{BROADCAST_ADDR, MAX_COMMAND_PAYLOAD};
use crate::simulation::MAX_NODE_COUNT;

/// A deployment scenario: one acoustic network plus the channel model the
/// harness runs it over.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// Network identifier shared by every node.
    pub network_id: u16,
    /// Scheduler tick per node (ms). Bounded below by modem frame time in a
    /// real deployment; here it just paces the simulation.
    pub tick_interval_ms: u64,
    /// One-way propagation delay of the medium (ms).
    pub propagation_delay_ms: u64,
    /// Independent per-receiver probability that a frame is lost.
    pub loss_probability: f32,
    /// All nodes in the scenario.
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub device_id: u16,
    /// Supply voltage this node reports to status queries.
    #[serde(default = "default_supply_voltage")]
    pub supply_voltage: f32,
    /// Neighbors to range against at startup, one roster slot each.
    #[serde(default)]
    pub ping_targets: Vec<u16>,
    /// Scripted commands this node originates.
    #[serde(default)]
    pub traffic: Vec<TrafficEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficEntry {
    /// When to send, relative to scenario start (ms).
    pub after_ms: u64,
    pub dest_addr: u16,
    /// Raw command type byte; unknown values exercise the error path on the
    /// receiver.
    pub command: u8,
    #[serde(default)]
    pub payload: Vec<u8>,
}

fn default_supply_voltage() -> f32 {
    4.2
}

impl Scenario {
    /// Load and validate a scenario from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = toml::from_str(&content)
            .with_context(|| format!("failed to parse scenario file {}", path.display()))?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Reject scenarios that would misbehave at runtime.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.nodes.is_empty() {
            anyhow::bail!("scenario must contain at least one node");
        }
        if self.nodes.len() > MAX_NODE_COUNT {
            anyhow::bail!(
                "node count {} exceeds the task pool size {}",
                self.nodes.len(),
                MAX_NODE_COUNT
            );
        }
        if !(0.0..1.0).contains(&self.loss_probability) {
            anyhow::bail!(
                "loss_probability {} must be in [0, 1)",
                self.loss_probability
            );
        }
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be positive");
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.device_id == 0 {
                anyhow::bail!("device_id 0 is reserved (empty roster slot marker)");
            }
            if node.device_id == BROADCAST_ADDR {
                anyhow::bail!("device_id {:#06x} is the broadcast address", BROADCAST_ADDR);
            }
            if !seen.insert(node.device_id) {
                anyhow::bail!("duplicate device_id {}", node.device_id);
            }
            if node.ping_targets.len() > PING_ROSTER_SIZE {
                anyhow::bail!(
                    "node {} has {} ping targets, the roster holds {}",
                    node.device_id,
                    node.ping_targets.len(),
                    PING_ROSTER_SIZE
                );
            }
            for entry in &node.traffic {
                if entry.payload.len() > MAX_COMMAND_PAYLOAD {
                    anyhow::bail!(
                        "node {} traffic payload of {} bytes exceeds the {}-byte limit",
                        node.device_id,
                        entry.payload.len(),
                        MAX_COMMAND_PAYLOAD
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(extra: &str) -> String {
        format!(
            r#"
network_id = 1
tick_interval_ms = 100
propagation_delay_ms = 50
loss_probability = 0.1

[[nodes]]
device_id = 2

{extra}
"#
        )
    }

    #[test]
    fn minimal_scenario_parses_with_defaults() {
        let scenario: Scenario = toml::from_str(&minimal("")).unwrap();
        scenario.validate().unwrap();
        assert_eq!(scenario.nodes[0].device_id, 2);
        assert_eq!(scenario.nodes[0].supply_voltage, 4.2);
        assert!(scenario.nodes[0].ping_targets.is_empty());
        assert!(scenario.nodes[0].traffic.is_empty());
    }

    #[test]
    fn traffic_entries_parse() {
        let toml = minimal(
            r#"
[[nodes]]
device_id = 3
ping_targets = [2]

[[nodes.traffic]]
after_ms = 500
dest_addr = 2
command = 1
payload = [1, 2, 3]
"#,
        );
        let scenario: Scenario = toml::from_str(&toml).unwrap();
        scenario.validate().unwrap();
        let node = &scenario.nodes[1];
        assert_eq!(node.ping_targets, vec![2]);
        assert_eq!(node.traffic[0].dest_addr, 2);
        assert_eq!(node.traffic[0].payload, vec![1, 2, 3]);
    }

    #[test]
    fn invalid_scenarios_are_rejected() {
        let duplicate = minimal("[[nodes]]\ndevice_id = 2\n");
        let scenario: Scenario = toml::from_str(&duplicate).unwrap();
        assert!(scenario.validate().is_err());

        let zero_id = minimal("").replace("device_id = 2", "device_id = 0");
        let scenario: Scenario = toml::from_str(&zero_id).unwrap();
        assert!(scenario.validate().is_err());

        let lossy = minimal("").replace("loss_probability = 0.1", "loss_probability = 1.5");
        let scenario: Scenario = toml::from_str(&lossy).unwrap();
        assert!(scenario.validate().is_err());
    }
}
