//! The FLOC node core: ingress pipeline, outbound builders, and glue state.
//!
//! A [`FlocNode`] owns every piece of mutable protocol state (identity and
//! pid counter, the duplicate filter, the outbound buffers) and is driven by
//! exactly one host loop:
//! - Received modem frames go through [`FlocNode::broadcast_received`]
//! - One [`FlocNode::dispatch`] per tick feeds the modem transmit channel
//!
//! Both calls run to completion with no suspension points; on a
//! multi-threaded host, wrap the node in one lock.
//!
//! ## Module Organization
//!
//! - `identity`: network/device ids and the packet-id allocator
//! - `types`: device actions and the ingress error taxonomy
//! - `buffer`: priority queues, retry/ack bookkeeping, ranging roster
//! - `nest`: serial framing for the supervisory host

pub mod buffer;
pub mod identity;
pub mod nest;
pub mod types;

use embassy_time::Instant;

use crate::modem::ModemDriver;
use crate::protocol::codec::{self, CodecError};
use crate::protocol::types::{
    BROADCAST_ADDR, CommandType, FLOC_HEADER_SIZE, FlocBody, FlocPacket, FlocPacketType,
    FlocPayload, MAX_COMMAND_PAYLOAD, MAX_DATA_PAYLOAD, TTL_START,
};
use crate::protocol::DuplicateFilter;

pub use buffer::{BufferManager, DispatchClass, MAX_SEND_BUFFER, MAX_TRANSMISSIONS};
pub use identity::NodeIdentity;
pub use types::{DeviceAction, IngressError};

/// All protocol state for one node, owned by the host's tick loop.
#[derive(Debug)]
pub struct FlocNode {
    identity: NodeIdentity,
    filter: DuplicateFilter,
    buffers: BufferManager,
    /// Address to answer with the next modem status result, stored by
    /// [`FlocNode::status_query`].
    status_reply_addr: Option<u16>,
}

impl FlocNode {
    pub fn new(network_id: u16, device_id: u16, now: Instant) -> Self {
        Self {
            identity: NodeIdentity::new(network_id, device_id),
            filter: DuplicateFilter::new(now),
            buffers: BufferManager::new(),
            status_reply_addr: None,
        }
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut NodeIdentity {
        &mut self.identity
    }

    pub fn buffers(&self) -> &BufferManager {
        &self.buffers
    }

    /// Run one received frame through the ingress pipeline.
    ///
    /// Steps, each aborting on failure: length/type floor, duplicate check,
    /// network filter, self-echo filter, per-type parse and side effects,
    /// then forward-vs-consume classification into the buffers.
    ///
    /// A frame addressed to this node (or broadcast) yields a device action;
    /// its payload borrows `frame`, so consumers copy what outlives the next
    /// ingress. Dropped frames still leave their fingerprint in the duplicate
    /// filter: a malformed flood should not be re-parsed on every hop's
    /// retransmission.
    pub fn broadcast_received<'a>(
        &mut self,
        frame: &'a [u8],
        now: Instant,
    ) -> Result<Option<DeviceAction<'a>>, IngressError> {
        let header = codec::decode_header(frame)?;

        if self
            .filter
            .contains(header.pid, header.dest_addr, header.src_addr)
        {
            return Err(IngressError::Duplicate);
        }
        self.filter.maybe_reset(now);
        self.filter
            .insert(header.pid, header.dest_addr, header.src_addr);

        if header.nid != self.identity.network_id() {
            return Err(IngressError::WrongNetwork(header.nid));
        }
        if header.src_addr == self.identity.device_id() {
            return Err(IngressError::SelfEcho);
        }

        let body = codec::decode_body(header.kind, &frame[FLOC_HEADER_SIZE..])?;

        let mine = header.dest_addr == self.identity.device_id()
            || header.dest_addr == BROADCAST_ADDR;
        let mut action = None;
        let mut unknown_command = None;
        if mine {
            match body {
                FlocBody::Data { data } => {
                    action = Some(DeviceAction::Data {
                        src_addr: header.src_addr,
                        last_hop_addr: header.last_hop_addr,
                        data,
                    });
                }
                FlocBody::Command { command, data } => match CommandType::try_from(command) {
                    Ok(command) => {
                        // Acknowledge before classification so the ack is
                        // queued ahead of any retransmission of the command
                        // itself.
                        self.send_ack(TTL_START, header.pid, header.src_addr);
                        action = Some(DeviceAction::Command {
                            src_addr: header.src_addr,
                            last_hop_addr: header.last_hop_addr,
                            command,
                            data,
                        });
                    }
                    Err(_) => unknown_command = Some(command),
                },
                FlocBody::Ack { ack_pid } => {
                    self.buffers.record_ack(ack_pid);
                    action = Some(DeviceAction::Ack {
                        src_addr: header.src_addr,
                        last_hop_addr: header.last_hop_addr,
                        ack_pid,
                    });
                }
                FlocBody::Response { request_pid, data } => {
                    action = Some(DeviceAction::Response {
                        src_addr: header.src_addr,
                        last_hop_addr: header.last_hop_addr,
                        request_pid,
                        error: header.error,
                        data,
                    });
                }
            }
        }

        // The whole packet, as received (TTL untouched): the buffer manager
        // decides whether it floods onward.
        self.buffers.handle_packet(
            self.identity.device_id(),
            FlocPacket {
                header,
                payload: body.to_owned(),
            },
        );

        if let Some(command) = unknown_command {
            return Err(IngressError::UnknownCommand(command));
        }
        Ok(action)
    }

    /// Perform one scheduler step, feeding at most one frame or ping to the
    /// modem.
    pub fn dispatch(&mut self, modem: &mut impl ModemDriver) -> DispatchClass {
        self.buffers.dispatch(&mut self.identity, modem)
    }

    /// Queue an acknowledgement for a received command.
    pub fn send_ack(&mut self, ttl: u8, ack_pid: u8, dest_addr: u16) {
        let header = self
            .identity
            .build_header(ttl, FlocPacketType::Ack, dest_addr, false);
        self.buffers.handle_packet(
            self.identity.device_id(),
            FlocPacket {
                header,
                payload: FlocPayload::Ack { ack_pid },
            },
        );
    }

    /// Queue an error RESPONSE (`res=1`, empty payload) toward `err_dst`.
    pub fn send_error(&mut self, ttl: u8, err_pid: u8, err_dst: u16) {
        self.buffers
            .enqueue_error(&mut self.identity, ttl, err_pid, err_dst);
    }

    /// Originate a command toward `dest_addr`. Returns the allocated pid so
    /// the caller can correlate the acknowledgement.
    pub fn send_command(
        &mut self,
        dest_addr: u16,
        command: CommandType,
        data: &[u8],
    ) -> Result<u8, CodecError> {
        if data.len() > MAX_COMMAND_PAYLOAD {
            return Err(CodecError::PayloadTooLarge {
                len: data.len(),
                max: MAX_COMMAND_PAYLOAD,
            });
        }
        let header =
            self.identity
                .build_header(TTL_START, FlocPacketType::Command, dest_addr, false);
        let pid = header.pid;
        self.buffers.handle_packet(
            self.identity.device_id(),
            FlocPacket {
                header,
                payload: FlocPayload::Command {
                    command: command as u8,
                    data: data.to_vec(),
                },
            },
        );
        Ok(pid)
    }

    /// Originate a data packet toward `dest_addr`.
    pub fn send_data(&mut self, dest_addr: u16, data: &[u8]) -> Result<u8, CodecError> {
        if data.len() > MAX_DATA_PAYLOAD {
            return Err(CodecError::PayloadTooLarge {
                len: data.len(),
                max: MAX_DATA_PAYLOAD,
            });
        }
        let header = self
            .identity
            .build_header(TTL_START, FlocPacketType::Data, dest_addr, false);
        let pid = header.pid;
        self.buffers.handle_packet(
            self.identity.device_id(),
            FlocPacket {
                header,
                payload: FlocPayload::Data {
                    data: data.to_vec(),
                },
            },
        );
        Ok(pid)
    }

    /// Remember who asked for status and kick off the modem query. The
    /// driver's eventual result comes back through [`FlocNode::send_status`].
    pub fn status_query(&mut self, dest_addr: u16, modem: &mut impl ModemDriver) {
        self.status_reply_addr = Some(dest_addr);
        modem.query_status();
    }

    /// Queue the status RESPONSE (`node_addr` followed by the big-endian
    /// `supply_voltage`) to the most recent query's requester.
    pub fn send_status(&mut self, node_addr: u8, supply_voltage: f32) {
        let Some(dest_addr) = self.status_reply_addr else {
            log::warn!("status result with no outstanding query, dropping");
            return;
        };
        let header =
            self.identity
                .build_header(TTL_START, FlocPacketType::Response, dest_addr, false);
        let request_pid = header.pid;
        let mut data = Vec::with_capacity(1 + 4);
        data.push(node_addr);
        data.extend_from_slice(&supply_voltage.to_be_bytes());
        self.buffers.handle_packet(
            self.identity.device_id(),
            FlocPacket {
                header,
                payload: FlocPayload::Response { request_pid, data },
            },
        );
    }

    /// Cancel an outstanding command after its acknowledgement surfaced as a
    /// device action. Returns whether a queued command was removed.
    pub fn remove_by_pid(&mut self, ack_pid: u8) -> bool {
        self.buffers.remove_by_pid(ack_pid)
    }

    /// Target a neighbor in the next ranging round.
    pub fn add_ping_target(&mut self, slot: usize, device_id: u16) {
        self.buffers.add_ping_target(slot, device_id);
    }

    /// Handle a frame from the supervisory host's serial link. Broadcast
    /// frames are already FLOC-framed and go straight to the modem, skipping
    /// the queues; unicast handling is reserved.
    pub fn nest_frame_received(
        &mut self,
        frame: &[u8],
        modem: &mut impl ModemDriver,
    ) -> Result<(), nest::NestError> {
        match nest::parse_host_frame(frame)? {
            nest::NestFrame::Broadcast { floc } => {
                log::debug!("host frame of {} bytes put on the air", floc.len());
                modem.broadcast(floc);
            }
            nest::NestFrame::Unicast { dest_addr, .. } => {
                log::warn!("host unicast frames are reserved, dropping (dest {dest_addr:#06x})");
            }
        }
        Ok(())
    }
}
