//! Node identity and the packet-id allocator.

use crate::protocol::types::{FlocHeader, FlocPacketType};

/// Who this node is on the FLOC network, plus the 6-bit packet-id counter
/// used for everything it originates.
///
/// Identity is set at boot from provisioning and only changes on
/// re-provisioning. Packet-id uniqueness is probabilistic: the counter wraps
/// mod 64, which is fine inside one duplicate-filter reset window.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    network_id: u16,
    device_id: u16,
    packet_id: u8,
}

impl NodeIdentity {
    pub fn new(network_id: u16, device_id: u16) -> Self {
        Self {
            network_id,
            device_id,
            packet_id: 0,
        }
    }

    pub fn network_id(&self) -> u16 {
        self.network_id
    }

    pub fn set_network_id(&mut self, network_id: u16) {
        self.network_id = network_id;
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    pub fn set_device_id(&mut self, device_id: u16) {
        self.device_id = device_id;
    }

    /// Return the current packet id and advance the counter, wrapping mod 64.
    pub fn use_packet_id(&mut self) -> u8 {
        let pid = self.packet_id;
        self.packet_id = (pid + 1) & 0x3F;
        pid
    }

    /// Fill a header for a locally-originated packet: fresh pid, this node as
    /// source and last hop.
    pub fn build_header(
        &mut self,
        ttl: u8,
        kind: FlocPacketType,
        dest_addr: u16,
        error: bool,
    ) -> FlocHeader {
        FlocHeader {
            ttl,
            kind,
            nid: self.network_id,
            error,
            pid: self.use_packet_id(),
            dest_addr,
            src_addr: self.device_id,
            last_hop_addr: self.device_id,
        }
    }
}
