//! Per-node asynchronous task logic.
//!
//! Each node runs an independent task that:
//! - Owns the node's protocol state and its simulated modem
//! - Feeds delivered frames into the ingress pipeline
//! - Runs one scheduler dispatch per tick
//! - Acts on surfaced device actions (ack cancellation, status queries)
//! - Originates the scripted traffic from the scenario file

use std::collections::VecDeque;

use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Instant, Timer};

use crate::config::{NodeConfig, TrafficEntry};
use crate::node::{DeviceAction, DispatchClass, FlocNode, nest};
use crate::protocol::types::CommandType;

use super::modem::SimulatedModem;
use super::types::{AirFrame, MAX_NODE_COUNT, NodeRxQueueReceiver, UplinkQueueSender};

/// One node's protocol state plus its modem and scenario parameters.
struct NodeRuntime {
    device_id: u16,
    node: FlocNode,
    modem: SimulatedModem,
}

impl NodeRuntime {
    fn initialize(network_id: u16, config: &NodeConfig, uplink_tx: UplinkQueueSender) -> Self {
        let mut node = FlocNode::new(network_id, config.device_id, Instant::now());
        for (slot, target) in config.ping_targets.iter().enumerate() {
            node.add_ping_target(slot, *target);
        }

        Self {
            device_id: config.device_id,
            node,
            modem: SimulatedModem::new(config.device_id, config.supply_voltage, uplink_tx),
        }
    }

    /// Run a delivered frame through ingress and act on the outcome.
    fn handle_frame(&mut self, frame: AirFrame) {
        match self.node.broadcast_received(&frame.bytes, Instant::now()) {
            Ok(Some(action)) => {
                // Anything delivered to this node also goes up to the
                // supervisory host over the local serial link; the harness
                // has no host attached, so the framing is built and dropped.
                let host_frame = nest::encode_host_frame(&frame.bytes);
                log::trace!(
                    "[{}] {} bytes framed for the host",
                    self.device_id,
                    host_frame.len()
                );
                self.handle_action(action);
            }
            Ok(None) => {}
            Err(err) => log::debug!(
                "[{}] dropped frame heard from {:#06x}: {err}",
                self.device_id,
                frame.sender
            ),
        }
    }

    /// Application glue for a surfaced device action. Payload references die
    /// with this call, so anything kept is copied here.
    fn handle_action(&mut self, action: DeviceAction<'_>) {
        match action {
            DeviceAction::Command {
                src_addr,
                command: CommandType::Release,
                ..
            } => {
                log::info!(
                    "[{}] release actuator triggered by {src_addr:#06x}",
                    self.device_id
                );
            }
            DeviceAction::Command {
                src_addr,
                command: CommandType::StatusQuery,
                ..
            } => {
                log::info!(
                    "[{}] status requested by {src_addr:#06x}",
                    self.device_id
                );
                self.node.status_query(src_addr, &mut self.modem);
            }
            DeviceAction::Ack { src_addr, ack_pid, .. } => {
                if self.node.remove_by_pid(ack_pid) {
                    log::info!(
                        "[{}] command pid {ack_pid} acknowledged by {src_addr:#06x}",
                        self.device_id
                    );
                }
            }
            DeviceAction::Data { src_addr, data, .. } => {
                log::info!(
                    "[{}] {} data bytes delivered from {src_addr:#06x}",
                    self.device_id,
                    data.len()
                );
            }
            DeviceAction::Response {
                src_addr,
                request_pid,
                error: true,
                ..
            } => {
                log::warn!(
                    "[{}] {src_addr:#06x} reports failure for request pid {request_pid}",
                    self.device_id
                );
            }
            DeviceAction::Response {
                src_addr,
                request_pid,
                data,
                ..
            } => {
                log::info!(
                    "[{}] response to pid {request_pid} from {src_addr:#06x} ({} bytes)",
                    self.device_id,
                    data.len()
                );
            }
        }
    }

    /// One scheduler tick: dispatch at most one outbound action, then drain
    /// any modem status callback into the response builder.
    fn tick(&mut self) {
        let class = self.node.dispatch(&mut self.modem);
        if class != DispatchClass::Idle {
            log::trace!("[{}] dispatched {class:?}", self.device_id);
        }
        if let Some(voltage) = self.modem.take_status() {
            self.node.send_status((self.device_id & 0xFF) as u8, voltage);
        }
    }

    /// Originate a scripted command.
    fn originate(&mut self, entry: TrafficEntry) {
        let Ok(command) = CommandType::try_from(entry.command) else {
            log::warn!(
                "[{}] traffic script names unknown command {:#04x}, skipping",
                self.device_id,
                entry.command
            );
            return;
        };
        match self.node.send_command(entry.dest_addr, command, &entry.payload) {
            Ok(pid) => log::info!(
                "[{}] queued {command:?} pid {pid} for {:#06x}",
                self.device_id,
                entry.dest_addr
            ),
            Err(err) => log::warn!("[{}] could not queue command: {err}", self.device_id),
        }
    }
}

/// Per-node task bridging the simulated medium and the protocol core.
#[embassy_executor::task(pool_size = MAX_NODE_COUNT)]
pub async fn node_task(
    network_id: u16,
    config: NodeConfig,
    rx: NodeRxQueueReceiver,
    uplink_tx: UplinkQueueSender,
    tick_interval: Duration,
) {
    let mut runtime = NodeRuntime::initialize(network_id, &config, uplink_tx);

    let started = Instant::now();
    let mut traffic: VecDeque<TrafficEntry> = {
        let mut entries = config.traffic.clone();
        entries.sort_by_key(|entry| entry.after_ms);
        entries.into()
    };

    log::info!(
        "[{}] node up on network {network_id:#06x}",
        config.device_id
    );

    loop {
        let next_send = traffic
            .front()
            .map(|entry| started + Duration::from_millis(entry.after_ms))
            .unwrap_or(Instant::MAX);

        match select3(rx.receive(), Timer::after(tick_interval), Timer::at(next_send)).await {
            Either3::First(frame) => runtime.handle_frame(frame),
            Either3::Second(()) => runtime.tick(),
            Either3::Third(()) => {
                if let Some(entry) = traffic.pop_front() {
                    runtime.originate(entry);
                }
            }
        }
    }
}
