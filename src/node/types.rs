//! Ingress outcomes: device actions and the error taxonomy.

use thiserror::Error;

use crate::protocol::codec::CodecError;
use crate::protocol::types::CommandType;

/// What the application should do in response to an accepted inbound packet.
///
/// One action is produced per packet addressed to this node (directly or via
/// broadcast). Payload references point into the receive buffer, so an action
/// is only valid until the next ingress runs; consumers copy what they keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction<'a> {
    /// Application data delivered to this node.
    Data {
        src_addr: u16,
        last_hop_addr: u16,
        data: &'a [u8],
    },
    /// A recognized command. The acknowledgement has already been queued by
    /// the time the action surfaces.
    Command {
        src_addr: u16,
        last_hop_addr: u16,
        command: CommandType,
        data: &'a [u8],
    },
    /// A neighbor acknowledged one of our packets. Glue layers feed `ack_pid`
    /// back into `FlocNode::remove_by_pid` to cancel the pending command.
    Ack {
        src_addr: u16,
        last_hop_addr: u16,
        ack_pid: u8,
    },
    /// A response to an earlier command of ours. `error` mirrors the wire
    /// `res` flag; error responses carry no payload.
    Response {
        src_addr: u16,
        last_hop_addr: u16,
        request_pid: u8,
        error: bool,
        data: &'a [u8],
    },
}

/// Why an inbound frame was dropped. All of these are recovered locally; the
/// tick caller logs and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IngressError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] CodecError),
    #[error("frame for network {0:#06x} is not ours")]
    WrongNetwork(u16),
    #[error("own transmission echoed back")]
    SelfEcho,
    #[error("already seen this flood entry")]
    Duplicate,
    #[error("unrecognized command type {0:#04x}")]
    UnknownCommand(u8),
}
