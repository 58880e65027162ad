//! Type definitions for the simulation harness.
//!
//! Bounded channels connect every node task to the shared medium task: one
//! uplink channel carries transmitted frames to the medium, and one delivery
//! channel per node carries frames the medium decided that node hears.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Upper bound on simulated nodes; sizes the node task pool.
pub const MAX_NODE_COUNT: usize = 32;

/// Depth of each node's delivery queue. Deliberately small: a node that
/// cannot keep up with the medium loses frames, like a real receiver.
pub const NODE_RX_QUEUE_SIZE: usize = 16;

/// Depth of the shared uplink queue (nodes → medium).
pub const UPLINK_QUEUE_SIZE: usize = 16;

/// A frame in flight on the simulated medium.
#[derive(Debug, Clone)]
pub struct AirFrame {
    /// Transmitting device, used to skip delivery back to the sender.
    pub sender: u16,
    pub bytes: Vec<u8>,
}

/// Bounded delivery channel for one node's receive path.
pub type NodeRxQueue =
    embassy_sync::channel::Channel<CriticalSectionRawMutex, AirFrame, NODE_RX_QUEUE_SIZE>;
/// Receiver side of a node's delivery channel.
pub type NodeRxQueueReceiver =
    embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, AirFrame, NODE_RX_QUEUE_SIZE>;
/// Sender side of a node's delivery channel.
pub type NodeRxQueueSender =
    embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, AirFrame, NODE_RX_QUEUE_SIZE>;

/// Bounded uplink channel shared by every node's modem.
pub type UplinkQueue =
    embassy_sync::channel::Channel<CriticalSectionRawMutex, AirFrame, UPLINK_QUEUE_SIZE>;
/// Receiver side of the uplink channel (owned by the medium task).
pub type UplinkQueueReceiver =
    embassy_sync::channel::Receiver<'static, CriticalSectionRawMutex, AirFrame, UPLINK_QUEUE_SIZE>;
/// Sender side of the uplink channel (one per simulated modem).
pub type UplinkQueueSender =
    embassy_sync::channel::Sender<'static, CriticalSectionRawMutex, AirFrame, UPLINK_QUEUE_SIZE>;
