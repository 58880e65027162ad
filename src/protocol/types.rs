//! Wire-level type definitions for the FLOC flooding layer.
//!
//! Contains the packet taxonomy shared by the codec, the ingress pipeline and
//! the outbound buffers:
//! - The common header carried by every frame
//! - Borrowed body views (decode output, zero-copy)
//! - Owned packets (queue entries, copied by value)
//! - Frame-size constants derived from the 64-byte modem limit

/// Initial hop budget for locally-originated packets.
pub const TTL_START: u8 = 3;

/// Maximum size of a complete FLOC frame, header included. The acoustic modem
/// rejects anything longer.
pub const FLOC_MAX_SIZE: usize = 64;

/// Size of the common header on the wire.
pub const FLOC_HEADER_SIZE: usize = 10;

/// Per-type sub-header sizes.
pub const DATA_HEADER_SIZE: usize = 1;
pub const COMMAND_HEADER_SIZE: usize = 2;
pub const ACK_HEADER_SIZE: usize = 1;
pub const RESPONSE_HEADER_SIZE: usize = 2;

/// Maximum inline payload per packet type, sized so a full frame never
/// exceeds [`FLOC_MAX_SIZE`].
pub const MAX_DATA_PAYLOAD: usize = FLOC_MAX_SIZE - FLOC_HEADER_SIZE - DATA_HEADER_SIZE;
pub const MAX_COMMAND_PAYLOAD: usize = FLOC_MAX_SIZE - FLOC_HEADER_SIZE - COMMAND_HEADER_SIZE;
pub const MAX_RESPONSE_PAYLOAD: usize = FLOC_MAX_SIZE - FLOC_HEADER_SIZE - RESPONSE_HEADER_SIZE;

/// Reserved destination address meaning "every node on the network".
pub const BROADCAST_ADDR: u16 = 0xFFFF;

/// The four FLOC packet types, carried in the low nibble of the first header
/// byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlocPacketType {
    Data = 0x0,
    Command = 0x1,
    Ack = 0x2,
    Response = 0x3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownPacketType(pub u8);

impl TryFrom<u8> for FlocPacketType {
    type Error = UnknownPacketType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x0 => FlocPacketType::Data,
            0x1 => FlocPacketType::Command,
            0x2 => FlocPacketType::Ack,
            0x3 => FlocPacketType::Response,
            other => return Err(UnknownPacketType(other)),
        })
    }
}

/// Application commands a COMMAND packet can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandType {
    /// Release the buoy actuator.
    Release = 0x1,
    /// Ask the receiving node to report its modem status.
    StatusQuery = 0x2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCommandType(pub u8);

impl TryFrom<u8> for CommandType {
    type Error = UnknownCommandType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x1 => CommandType::Release,
            0x2 => CommandType::StatusQuery,
            other => return Err(UnknownCommandType(other)),
        })
    }
}

/// Common header present on every FLOC frame. Field values are host order;
/// the codec converts multi-byte fields to network order on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlocHeader {
    /// Remaining hop budget, 4 bits. Decremented on retransmit, dropped at 0.
    pub ttl: u8,
    pub kind: FlocPacketType,
    /// Network identifier. Frames from other networks are discarded.
    pub nid: u16,
    /// Error flag (the wire `res` field, value 1). Set on error responses.
    pub error: bool,
    /// Packet identifier, 6 bits, scoped to the originator.
    pub pid: u8,
    /// Final destination device, or [`BROADCAST_ADDR`].
    pub dest_addr: u16,
    /// Originating device.
    pub src_addr: u16,
    /// Device that most recently transmitted this frame.
    pub last_hop_addr: u16,
}

/// Borrowed view of a type-specific packet body. Views point into the receive
/// buffer and are only valid while it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlocBody<'a> {
    Data { data: &'a [u8] },
    Command { command: u8, data: &'a [u8] },
    Ack { ack_pid: u8 },
    Response { request_pid: u8, data: &'a [u8] },
}

impl FlocBody<'_> {
    pub fn kind(&self) -> FlocPacketType {
        match self {
            FlocBody::Data { .. } => FlocPacketType::Data,
            FlocBody::Command { .. } => FlocPacketType::Command,
            FlocBody::Ack { .. } => FlocPacketType::Ack,
            FlocBody::Response { .. } => FlocPacketType::Response,
        }
    }

    /// Copy the view into an owned payload suitable for queueing.
    pub fn to_owned(&self) -> FlocPayload {
        match *self {
            FlocBody::Data { data } => FlocPayload::Data { data: data.to_vec() },
            FlocBody::Command { command, data } => FlocPayload::Command {
                command,
                data: data.to_vec(),
            },
            FlocBody::Ack { ack_pid } => FlocPayload::Ack { ack_pid },
            FlocBody::Response { request_pid, data } => FlocPayload::Response {
                request_pid,
                data: data.to_vec(),
            },
        }
    }
}

/// Owned type-specific packet body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlocPayload {
    Data { data: Vec<u8> },
    Command { command: u8, data: Vec<u8> },
    Ack { ack_pid: u8 },
    Response { request_pid: u8, data: Vec<u8> },
}

impl FlocPayload {
    /// Borrow the payload back as a decode-style view.
    pub fn as_body(&self) -> FlocBody<'_> {
        match self {
            FlocPayload::Data { data } => FlocBody::Data { data },
            FlocPayload::Command { command, data } => FlocBody::Command {
                command: *command,
                data,
            },
            FlocPayload::Ack { ack_pid } => FlocBody::Ack { ack_pid: *ack_pid },
            FlocPayload::Response { request_pid, data } => FlocBody::Response {
                request_pid: *request_pid,
                data,
            },
        }
    }
}

/// A complete owned packet: queue entries hold these by value so nothing in
/// the buffers aliases the modem receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlocPacket {
    pub header: FlocHeader,
    pub payload: FlocPayload,
}

impl FlocPacket {
    /// The frame length this packet occupies on the wire: common header plus
    /// sub-header plus the actual payload bytes, not the type maximum.
    pub fn wire_size(&self) -> usize {
        FLOC_HEADER_SIZE
            + match &self.payload {
                FlocPayload::Data { data } => DATA_HEADER_SIZE + data.len(),
                FlocPayload::Command { data, .. } => COMMAND_HEADER_SIZE + data.len(),
                FlocPayload::Ack { .. } => ACK_HEADER_SIZE,
                FlocPayload::Response { data, .. } => RESPONSE_HEADER_SIZE + data.len(),
            }
    }
}
