//! Outbound buffers and the dispatch scheduler.
//!
//! Three bounded FIFOs in strict priority order (retransmit, then response,
//! then command) plus the bookkeeping that completes or expires queued
//! commands: per-pid transmission counters, the set of observed
//! acknowledgements, and the three-slot ranging roster that preempts queue
//! work while a ping round is active.
//!
//! One call to [`BufferManager::dispatch`] performs at most one action, so
//! the modem transmit channel sees at most one frame per tick.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::modem::{ModemDriver, modem_id_from};
use crate::node::identity::NodeIdentity;
use crate::protocol::codec::encode_frame;
use crate::protocol::types::{FLOC_MAX_SIZE, FlocPacket, FlocPacketType, FlocPayload};

/// Broadcast attempts per locally-originated command, and pings per roster
/// slot, before giving up.
pub const MAX_TRANSMISSIONS: u8 = 5;

/// Capacity of each outbound queue. Overflow drops the new packet.
pub const MAX_SEND_BUFFER: usize = 5;

/// Number of neighbors a ranging round can target.
pub const PING_ROSTER_SIZE: usize = 3;

/// Which action a dispatch step performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchClass {
    Idle,
    Ping,
    Retransmit,
    Response,
    Command,
}

#[derive(Debug, Clone, Copy, Default)]
struct PingSlot {
    device_id: u16,
    ping_count: u8,
}

/// Priority queues and completion state for everything this node transmits.
#[derive(Debug, Default)]
pub struct BufferManager {
    retransmit_q: VecDeque<FlocPacket>,
    response_q: VecDeque<FlocPacket>,
    command_q: VecDeque<FlocPacket>,
    /// Broadcast count per locally-originated command pid.
    tx_counts: HashMap<u8, u8>,
    /// Acknowledgements observed for outstanding commands.
    acked: HashSet<u8>,
    ping_roster: [PingSlot; PING_ROSTER_SIZE],
    ping_cursor: usize,
}

fn push_bounded(queue: &mut VecDeque<FlocPacket>, name: &str, packet: FlocPacket) {
    if queue.len() >= MAX_SEND_BUFFER {
        log::warn!(
            "{name} queue full, dropping pid {} for {:#06x}",
            packet.header.pid,
            packet.header.dest_addr
        );
        return;
    }
    queue.push_back(packet);
}

fn broadcast_packet(packet: &FlocPacket, modem: &mut impl ModemDriver) {
    let mut frame = [0u8; FLOC_MAX_SIZE];
    match encode_frame(packet, &mut frame) {
        Ok(len) => modem.broadcast(&frame[..len]),
        // Queued packets went through the bounded builders, so this is a
        // logic error, not a wire condition.
        Err(err) => log::error!("dropping unencodable queued packet: {err}"),
    }
}

impl BufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a packet into the queue it belongs to.
    ///
    /// Locally-originated packets go to the command or response queue by
    /// type. Foreign packets not addressed to us become retransmission
    /// candidates; foreign packets addressed to us were already surfaced as a
    /// device action and need nothing further. Every enqueue copies by value.
    pub fn handle_packet(&mut self, device_id: u16, packet: FlocPacket) {
        if packet.header.src_addr == device_id {
            match packet.header.kind {
                FlocPacketType::Command => push_bounded(&mut self.command_q, "command", packet),
                FlocPacketType::Data | FlocPacketType::Ack | FlocPacketType::Response => {
                    push_bounded(&mut self.response_q, "response", packet)
                }
            }
        } else if packet.header.dest_addr != device_id {
            push_bounded(&mut self.retransmit_q, "retransmit", packet);
        } else {
            log::debug!(
                "pid {} from {:#06x} delivered locally, not queued",
                packet.header.pid,
                packet.header.src_addr
            );
        }
    }

    /// Record an acknowledgement seen on the wire.
    pub fn record_ack(&mut self, ack_pid: u8) {
        self.acked.insert(ack_pid);
    }

    /// Cancel the first queued command with this pid: remove it, erase its
    /// transmission counter, and consume the matching ack-set entry.
    ///
    /// Returns whether a command was actually cancelled.
    pub fn remove_by_pid(&mut self, ack_pid: u8) -> bool {
        self.acked.remove(&ack_pid);
        if let Some(idx) = self
            .command_q
            .iter()
            .position(|p| p.header.pid == ack_pid)
        {
            let _ = self.command_q.remove(idx);
            self.tx_counts.remove(&ack_pid);
            log::debug!("command pid {ack_pid} acknowledged and removed");
            true
        } else {
            false
        }
    }

    /// Put a neighbor into a ranging-roster slot with a fresh ping count.
    /// Slot 0 gates the whole round: while it holds a device, dispatch runs
    /// the ping phase instead of queue work.
    pub fn add_ping_target(&mut self, slot: usize, device_id: u16) {
        if slot >= PING_ROSTER_SIZE {
            log::warn!("ping roster has no slot {slot}, ignoring device {device_id:#06x}");
            return;
        }
        self.ping_roster[slot] = PingSlot {
            device_id,
            ping_count: 0,
        };
    }

    pub fn retransmit_len(&self) -> usize {
        self.retransmit_q.len()
    }

    pub fn response_len(&self) -> usize {
        self.response_q.len()
    }

    pub fn command_len(&self) -> usize {
        self.command_q.len()
    }

    /// True when a dispatch step would have nothing to do.
    pub fn is_idle(&self) -> bool {
        self.ping_roster[0].device_id == 0
            && self.retransmit_q.is_empty()
            && self.response_q.is_empty()
            && self.command_q.is_empty()
    }

    /// Build and enqueue an error RESPONSE (`res=1`, empty payload) for a
    /// request that cannot be satisfied.
    pub(crate) fn enqueue_error(
        &mut self,
        identity: &mut NodeIdentity,
        ttl: u8,
        err_pid: u8,
        err_dst: u16,
    ) {
        let header = identity.build_header(ttl, FlocPacketType::Response, err_dst, true);
        let packet = FlocPacket {
            header,
            payload: FlocPayload::Response {
                request_pid: err_pid,
                data: Vec::new(),
            },
        };
        self.handle_packet(identity.device_id(), packet);
    }

    /// Perform exactly one outbound action, in priority order: ranging round,
    /// retransmit, response, command.
    pub fn dispatch(
        &mut self,
        identity: &mut NodeIdentity,
        modem: &mut impl ModemDriver,
    ) -> DispatchClass {
        if self.ping_roster[0].device_id != 0 {
            self.ping_step(identity.network_id(), modem);
            return DispatchClass::Ping;
        }

        if let Some(mut packet) = self.retransmit_q.pop_front() {
            if packet.header.ttl > 1 {
                packet.header.ttl -= 1;
                packet.header.last_hop_addr = identity.device_id();
                log::debug!(
                    "retransmitting pid {} from {:#06x}, ttl now {}",
                    packet.header.pid,
                    packet.header.src_addr,
                    packet.header.ttl
                );
                broadcast_packet(&packet, modem);
            } else {
                log::debug!(
                    "ttl exhausted on pid {} from {:#06x}, dropping",
                    packet.header.pid,
                    packet.header.src_addr
                );
            }
            return DispatchClass::Retransmit;
        }

        if let Some(packet) = self.response_q.pop_front() {
            broadcast_packet(&packet, modem);
            return DispatchClass::Response;
        }

        if let Some(front) = self.command_q.front() {
            let pid = front.header.pid;
            let err_dst = front.header.src_addr;
            let count = *self.tx_counts.entry(pid).or_insert(0);
            if count >= MAX_TRANSMISSIONS {
                self.command_q.pop_front();
                self.tx_counts.remove(&pid);
                log::warn!("command pid {pid} unacknowledged after {MAX_TRANSMISSIONS} transmissions, giving up");
                self.enqueue_error(identity, 1, pid, err_dst);
            } else {
                self.tx_counts.insert(pid, count + 1);
                if let Some(front) = self.command_q.front() {
                    broadcast_packet(front, modem);
                }
            }
            return DispatchClass::Command;
        }

        DispatchClass::Idle
    }

    /// Advance the ranging round by at most one ping.
    ///
    /// The cursor stays on a slot until its count reaches
    /// [`MAX_TRANSMISSIONS`], then moves on; once it passes the last slot the
    /// roster is zeroed and queue work resumes on the next dispatch.
    fn ping_step(&mut self, network_id: u16, modem: &mut impl ModemDriver) {
        while self.ping_cursor < PING_ROSTER_SIZE {
            let slot = &mut self.ping_roster[self.ping_cursor];
            if slot.device_id == 0 {
                self.ping_cursor += 1;
                continue;
            }
            if slot.ping_count < MAX_TRANSMISSIONS {
                slot.ping_count += 1;
                let target = slot.device_id;
                let count = slot.ping_count;
                log::debug!("ranging ping {count}/{MAX_TRANSMISSIONS} to device {target:#06x}");
                modem.ping(modem_id_from(target, network_id));
                return;
            }
            self.ping_cursor += 1;
        }

        log::info!("ranging round complete, roster cleared");
        self.ping_roster = [PingSlot::default(); PING_ROSTER_SIZE];
        self.ping_cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modem::testing::RecordingModem;
    use crate::protocol::codec::decode_frame;
    use crate::protocol::types::{FlocBody, FlocHeader};

    const NETWORK: u16 = 0x0001;
    const US: u16 = 0x0002;

    fn identity() -> NodeIdentity {
        NodeIdentity::new(NETWORK, US)
    }

    fn packet(kind: FlocPacketType, pid: u8, dest: u16, src: u16, ttl: u8) -> FlocPacket {
        let payload = match kind {
            FlocPacketType::Data => FlocPayload::Data { data: vec![0xAB] },
            FlocPacketType::Command => FlocPayload::Command {
                command: 0x1,
                data: Vec::new(),
            },
            FlocPacketType::Ack => FlocPayload::Ack { ack_pid: pid },
            FlocPacketType::Response => FlocPayload::Response {
                request_pid: pid,
                data: Vec::new(),
            },
        };
        FlocPacket {
            header: FlocHeader {
                ttl,
                kind,
                nid: NETWORK,
                error: false,
                pid,
                dest_addr: dest,
                src_addr: src,
                last_hop_addr: src,
            },
            payload,
        }
    }

    #[test]
    fn classification_routes_by_origin_then_destination() {
        let mut buffers = BufferManager::new();

        // Locally originated: by type.
        buffers.handle_packet(US, packet(FlocPacketType::Command, 1, 0x0009, US, 3));
        buffers.handle_packet(US, packet(FlocPacketType::Ack, 2, 0x0009, US, 3));
        // Foreign, other destination: retransmit candidate.
        buffers.handle_packet(US, packet(FlocPacketType::Data, 3, 0x0009, 0x0003, 3));
        // Foreign, delivered to us: consumed by the application layer.
        buffers.handle_packet(US, packet(FlocPacketType::Data, 4, US, 0x0003, 3));

        assert_eq!(buffers.command_len(), 1);
        assert_eq!(buffers.response_len(), 1);
        assert_eq!(buffers.retransmit_len(), 1);
    }

    #[test]
    fn queue_overflow_drops_the_new_packet_silently() {
        let mut buffers = BufferManager::new();
        for pid in 0..(MAX_SEND_BUFFER as u8 + 2) {
            buffers.handle_packet(US, packet(FlocPacketType::Data, pid, 0x0009, 0x0003, 3));
        }
        assert_eq!(buffers.retransmit_len(), MAX_SEND_BUFFER);
        assert_eq!(buffers.response_len(), 0);
        assert_eq!(buffers.command_len(), 0);

        // The survivors are the first five, FIFO.
        let mut identity = identity();
        let mut modem = RecordingModem::default();
        buffers.dispatch(&mut identity, &mut modem);
        let (header, _) = decode_frame(&modem.broadcasts[0]).unwrap();
        assert_eq!(header.pid, 0);
    }

    #[test]
    fn dispatch_priority_is_retransmit_then_response_then_command() {
        let mut buffers = BufferManager::new();
        let mut identity = identity();
        let mut modem = RecordingModem::default();

        buffers.handle_packet(US, packet(FlocPacketType::Command, 10, 0x0009, US, 3));
        buffers.handle_packet(US, packet(FlocPacketType::Response, 11, 0x0009, US, 3));
        buffers.handle_packet(US, packet(FlocPacketType::Data, 12, 0x0009, 0x0003, 3));

        let classes = [
            buffers.dispatch(&mut identity, &mut modem),
            buffers.dispatch(&mut identity, &mut modem),
            buffers.dispatch(&mut identity, &mut modem),
        ];
        assert_eq!(
            classes,
            [
                DispatchClass::Retransmit,
                DispatchClass::Response,
                DispatchClass::Command
            ]
        );

        let kinds: Vec<FlocPacketType> = modem
            .broadcasts
            .iter()
            .map(|frame| decode_frame(frame).unwrap().0.kind)
            .collect();
        assert_eq!(
            kinds,
            [
                FlocPacketType::Data,
                FlocPacketType::Response,
                FlocPacketType::Command
            ]
        );
    }

    #[test]
    fn retransmit_decrements_ttl_and_stamps_last_hop() {
        let mut buffers = BufferManager::new();
        let mut identity = identity();
        let mut modem = RecordingModem::default();

        buffers.handle_packet(US, packet(FlocPacketType::Data, 5, 0x0009, 0x0003, 3));
        assert_eq!(
            buffers.dispatch(&mut identity, &mut modem),
            DispatchClass::Retransmit
        );

        let (header, _) = decode_frame(&modem.broadcasts[0]).unwrap();
        assert_eq!(header.ttl, 2);
        assert_eq!(header.last_hop_addr, US);
        assert_eq!(header.src_addr, 0x0003);

        // Queue drained.
        assert_eq!(buffers.dispatch(&mut identity, &mut modem), DispatchClass::Idle);
    }

    #[test]
    fn exhausted_ttl_drops_without_broadcasting() {
        let mut buffers = BufferManager::new();
        let mut identity = identity();
        let mut modem = RecordingModem::default();

        buffers.handle_packet(US, packet(FlocPacketType::Data, 5, 0x0009, 0x0003, 1));
        assert_eq!(
            buffers.dispatch(&mut identity, &mut modem),
            DispatchClass::Retransmit
        );
        assert!(modem.broadcasts.is_empty());
        assert_eq!(buffers.retransmit_len(), 0);
    }

    #[test]
    fn command_retries_until_the_bound_then_emits_an_error() {
        let mut buffers = BufferManager::new();
        let mut identity = identity();
        let mut modem = RecordingModem::default();

        buffers.handle_packet(US, packet(FlocPacketType::Command, 7, 0x0009, US, 3));

        for _ in 0..MAX_TRANSMISSIONS {
            assert_eq!(
                buffers.dispatch(&mut identity, &mut modem),
                DispatchClass::Command
            );
        }
        assert_eq!(modem.broadcasts.len(), MAX_TRANSMISSIONS as usize);
        for frame in &modem.broadcasts {
            let (header, _) = decode_frame(frame).unwrap();
            assert_eq!(header.pid, 7);
        }
        assert_eq!(buffers.command_len(), 1);

        // The sixth dispatch gives up: command popped, error queued instead.
        assert_eq!(
            buffers.dispatch(&mut identity, &mut modem),
            DispatchClass::Command
        );
        assert_eq!(modem.broadcasts.len(), MAX_TRANSMISSIONS as usize);
        assert_eq!(buffers.command_len(), 0);
        assert_eq!(buffers.response_len(), 1);
        assert!(buffers.tx_counts.is_empty());

        assert_eq!(
            buffers.dispatch(&mut identity, &mut modem),
            DispatchClass::Response
        );
        let (header, body) = decode_frame(modem.broadcasts.last().unwrap()).unwrap();
        assert!(header.error);
        assert_eq!(header.ttl, 1);
        assert_eq!(header.dest_addr, US);
        assert_eq!(
            body,
            FlocBody::Response {
                request_pid: 7,
                data: &[]
            }
        );
    }

    #[test]
    fn remove_by_pid_cancels_the_command_and_its_counter() {
        let mut buffers = BufferManager::new();
        let mut identity = identity();
        let mut modem = RecordingModem::default();

        buffers.handle_packet(US, packet(FlocPacketType::Command, 7, 0x0009, US, 3));
        buffers.handle_packet(US, packet(FlocPacketType::Command, 8, 0x0009, US, 3));
        buffers.dispatch(&mut identity, &mut modem); // pid 7 transmitted once

        buffers.record_ack(7);
        assert!(buffers.remove_by_pid(7));
        assert_eq!(buffers.command_len(), 1);
        assert!(!buffers.tx_counts.contains_key(&7));
        assert!(!buffers.acked.contains(&7));

        // pid 8 is untouched and next in line.
        assert_eq!(
            buffers.dispatch(&mut identity, &mut modem),
            DispatchClass::Command
        );
        let (header, _) = decode_frame(modem.broadcasts.last().unwrap()).unwrap();
        assert_eq!(header.pid, 8);

        assert!(!buffers.remove_by_pid(42));
    }

    #[test]
    fn ping_round_exhausts_each_slot_in_order_then_clears() {
        let mut buffers = BufferManager::new();
        let mut identity = identity();
        let mut modem = RecordingModem::default();

        buffers.add_ping_target(0, 11);
        buffers.add_ping_target(1, 12);
        // Queue work waits until the round is over.
        buffers.handle_packet(US, packet(FlocPacketType::Data, 5, 0x0009, 0x0003, 3));

        let mut pings_done = 0;
        loop {
            match buffers.dispatch(&mut identity, &mut modem) {
                DispatchClass::Ping => pings_done += 1,
                other => {
                    assert_eq!(other, DispatchClass::Retransmit);
                    break;
                }
            }
            assert!(pings_done <= 20, "ping round never terminated");
        }

        // Five pings to slot 0, then five to slot 1, then one closing step.
        assert_eq!(modem.pings.len(), 2 * MAX_TRANSMISSIONS as usize);
        assert!(modem.pings[..5].iter().all(|&id| id == 11));
        assert!(modem.pings[5..].iter().all(|&id| id == 12));
        assert_eq!(pings_done, 2 * MAX_TRANSMISSIONS as usize + 1);
        assert!(buffers.ping_roster.iter().all(|slot| slot.device_id == 0));
    }
}
