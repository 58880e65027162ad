//! The shared medium task and scenario bring-up.
//!
//! The medium is a single task modeling the water column as the modems see
//! it: half-duplex (one frame in flight at a time), a fixed one-way
//! propagation delay, and independent per-receiver loss. Every transmitted
//! frame reaches every other node that wins its loss draw; the sender never
//! hears itself at this layer (self-suppression belongs to the protocol, and
//! is exercised over multi-hop echoes instead).

use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};

use crate::config::Scenario;

use super::node_task::node_task;
use super::types::{NodeRxQueue, NodeRxQueueSender, UplinkQueue, UplinkQueueReceiver};

/// Deliver uplinked frames to every other node, applying the channel model.
#[embassy_executor::task]
pub async fn medium_task(
    uplink_rx: UplinkQueueReceiver,
    delivery: Vec<(u16, NodeRxQueueSender)>,
    propagation_delay: Duration,
    loss_probability: f32,
) {
    loop {
        let frame = uplink_rx.receive().await;
        log::debug!(
            "[{}] {} bytes on the air",
            frame.sender,
            frame.bytes.len()
        );

        // Half-duplex medium: the next frame waits until this one lands.
        Timer::after(propagation_delay).await;

        for (device_id, tx) in &delivery {
            if *device_id == frame.sender {
                continue;
            }
            if rand::random::<f32>() < loss_probability {
                log::debug!("[{device_id}] frame from {} lost in transit", frame.sender);
                continue;
            }
            if tx.try_send(frame.clone()).is_err() {
                log::warn!("[{device_id}] receive queue full, frame lost");
            }
        }
    }
}

/// Leak the channel plumbing and spawn one task per node plus the medium.
///
/// Channels are `Box::leak`ed for the `'static` lifetimes the executor
/// requires; they live for the whole process.
pub fn spawn_network(spawner: Spawner, scenario: Scenario) {
    let uplink: &'static UplinkQueue = Box::leak(Box::new(UplinkQueue::new()));

    let mut delivery = Vec::with_capacity(scenario.nodes.len());
    for node_config in &scenario.nodes {
        let rx_queue: &'static NodeRxQueue = Box::leak(Box::new(NodeRxQueue::new()));
        delivery.push((node_config.device_id, rx_queue.sender()));

        let _ = spawner.spawn(node_task(
            scenario.network_id,
            node_config.clone(),
            rx_queue.receiver(),
            uplink.sender(),
            Duration::from_millis(scenario.tick_interval_ms),
        ));
    }

    let _ = spawner.spawn(medium_task(
        uplink.receiver(),
        delivery,
        Duration::from_millis(scenario.propagation_delay_ms),
        scenario.loss_probability,
    ));
}
