//! Bit-exact encode/decode of the FLOC wire format.
//!
//! The packed layout leaves no padding and splits two bytes between
//! sub-byte fields, so everything is done with explicit shifts and masks
//! rather than struct layout tricks:
//!
//! ```text
//! byte 0      (ttl << 4) | type
//! bytes 1-2   nid, big-endian
//! byte 3      (res << 6) | pid
//! bytes 4-5   dest_addr, big-endian
//! bytes 6-7   src_addr, big-endian
//! bytes 8-9   last_hop_addr, big-endian
//! byte 10..   type-specific sub-header and payload
//! ```
//!
//! Decoding never allocates; it returns views into the caller's buffer.

use thiserror::Error;

use super::types::{
    ACK_HEADER_SIZE, COMMAND_HEADER_SIZE, DATA_HEADER_SIZE, FLOC_HEADER_SIZE, FlocBody,
    FlocHeader, FlocPacket, FlocPacketType, FlocPayload, MAX_COMMAND_PAYLOAD, MAX_DATA_PAYLOAD,
    MAX_RESPONSE_PAYLOAD, RESPONSE_HEADER_SIZE,
};

/// Ways a frame can fail to parse or a packet can fail to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("frame of {len} bytes is shorter than the {need}-byte minimum")]
    Truncated { len: usize, need: usize },
    #[error("unknown packet type {0:#x}")]
    UnknownPacketType(u8),
    #[error("declared payload size {declared} exceeds the {available} bytes present")]
    PayloadTruncated { declared: usize, available: usize },
    #[error("payload of {len} bytes exceeds the {max}-byte limit for this packet type")]
    PayloadTooLarge { len: usize, max: usize },
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

/// Decode the common header from the front of `buf`.
pub fn decode_header(buf: &[u8]) -> Result<FlocHeader, CodecError> {
    if buf.len() < FLOC_HEADER_SIZE {
        return Err(CodecError::Truncated {
            len: buf.len(),
            need: FLOC_HEADER_SIZE,
        });
    }

    let kind = FlocPacketType::try_from(buf[0] & 0x0F)
        .map_err(|e| CodecError::UnknownPacketType(e.0))?;

    Ok(FlocHeader {
        ttl: buf[0] >> 4,
        kind,
        nid: read_u16(buf, 1),
        error: (buf[3] >> 6) == 1,
        pid: buf[3] & 0x3F,
        dest_addr: read_u16(buf, 4),
        src_addr: read_u16(buf, 6),
        last_hop_addr: read_u16(buf, 8),
    })
}

/// Slice the declared payload out of `buf`, which starts at the sub-header.
fn payload_of(buf: &[u8], sub_header: usize, size: usize) -> Result<&[u8], CodecError> {
    let available = buf.len() - sub_header;
    if available < size {
        return Err(CodecError::PayloadTruncated {
            declared: size,
            available,
        });
    }
    Ok(&buf[sub_header..sub_header + size])
}

/// Decode the type-specific body. `buf` starts right after the common header.
///
/// Fails when `buf` is shorter than the sub-header for `kind`, or shorter
/// than the sub-header plus the declared payload size. Trailing bytes past
/// the declared size are ignored.
pub fn decode_body(kind: FlocPacketType, buf: &[u8]) -> Result<FlocBody<'_>, CodecError> {
    let sub_header = match kind {
        FlocPacketType::Data => DATA_HEADER_SIZE,
        FlocPacketType::Command => COMMAND_HEADER_SIZE,
        FlocPacketType::Ack => ACK_HEADER_SIZE,
        FlocPacketType::Response => RESPONSE_HEADER_SIZE,
    };
    if buf.len() < sub_header {
        return Err(CodecError::Truncated {
            len: buf.len(),
            need: sub_header,
        });
    }

    Ok(match kind {
        FlocPacketType::Data => FlocBody::Data {
            data: payload_of(buf, sub_header, buf[0] as usize)?,
        },
        FlocPacketType::Command => FlocBody::Command {
            command: buf[0],
            data: payload_of(buf, sub_header, buf[1] as usize)?,
        },
        FlocPacketType::Ack => FlocBody::Ack { ack_pid: buf[0] },
        FlocPacketType::Response => FlocBody::Response {
            request_pid: buf[0],
            data: payload_of(buf, sub_header, buf[1] as usize)?,
        },
    })
}

/// Decode a complete frame into its header and body view.
pub fn decode_frame(buf: &[u8]) -> Result<(FlocHeader, FlocBody<'_>), CodecError> {
    let header = decode_header(buf)?;
    let body = decode_body(header.kind, &buf[FLOC_HEADER_SIZE..])?;
    Ok((header, body))
}

fn encode_header(header: &FlocHeader, out: &mut [u8]) {
    out[0] = (header.ttl << 4) | (header.kind as u8);
    out[1..3].copy_from_slice(&header.nid.to_be_bytes());
    out[3] = (u8::from(header.error) << 6) | (header.pid & 0x3F);
    out[4..6].copy_from_slice(&header.dest_addr.to_be_bytes());
    out[6..8].copy_from_slice(&header.src_addr.to_be_bytes());
    out[8..10].copy_from_slice(&header.last_hop_addr.to_be_bytes());
}

/// Serialize a packet into `out` and return the actual frame length.
///
/// `out` must hold at least [`FlocPacket::wire_size`] bytes; a 64-byte buffer
/// always suffices for a valid packet.
pub fn encode_frame(packet: &FlocPacket, out: &mut [u8]) -> Result<usize, CodecError> {
    // A header whose type nibble disagrees with the payload variant would
    // encode a frame the receiver parses under the wrong sub-header layout.
    debug_assert_eq!(
        packet.header.kind,
        packet.payload.as_body().kind(),
        "header type disagrees with payload variant"
    );

    let check = |len: usize, max: usize| -> Result<(), CodecError> {
        if len > max {
            return Err(CodecError::PayloadTooLarge { len, max });
        }
        Ok(())
    };

    let total = packet.wire_size();
    match &packet.payload {
        FlocPayload::Data { data } => check(data.len(), MAX_DATA_PAYLOAD)?,
        FlocPayload::Command { data, .. } => check(data.len(), MAX_COMMAND_PAYLOAD)?,
        FlocPayload::Ack { .. } => {}
        FlocPayload::Response { data, .. } => check(data.len(), MAX_RESPONSE_PAYLOAD)?,
    }
    if out.len() < total {
        return Err(CodecError::Truncated {
            len: out.len(),
            need: total,
        });
    }

    encode_header(&packet.header, out);
    let body = &mut out[FLOC_HEADER_SIZE..];
    match &packet.payload {
        FlocPayload::Data { data } => {
            body[0] = data.len() as u8;
            body[1..1 + data.len()].copy_from_slice(data);
        }
        FlocPayload::Command { command, data } => {
            body[0] = *command;
            body[1] = data.len() as u8;
            body[2..2 + data.len()].copy_from_slice(data);
        }
        FlocPayload::Ack { ack_pid } => {
            body[0] = *ack_pid;
        }
        FlocPayload::Response { request_pid, data } => {
            body[0] = *request_pid;
            body[1] = data.len() as u8;
            body[2..2 + data.len()].copy_from_slice(data);
        }
    }

    Ok(total)
}
