//! Framing for the supervisory host ("NeST") serial link.
//!
//! Host frames wrap FLOC packets in a three-byte envelope:
//! `<direction:1><kind:1><size:1><body:size>`. Direction is `$` for
//! host-to-device traffic and `#` for device-to-host traffic; kind is `B`
//! (broadcast a pre-framed FLOC packet) or `U` (unicast, reserved).

use thiserror::Error;

/// Direction prefix on frames sent by the host.
pub const HOST_TO_DEVICE_PREFIX: u8 = b'$';
/// Direction prefix on frames sent to the host.
pub const DEVICE_TO_HOST_PREFIX: u8 = b'#';

const KIND_BROADCAST: u8 = b'B';
const KIND_UNICAST: u8 = b'U';

/// Envelope bytes before the body: direction, kind, size.
pub const SERIAL_ENVELOPE_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NestError {
    #[error("serial frame of {0} bytes is shorter than the 3-byte envelope")]
    TooShort(usize),
    #[error("unexpected direction prefix {0:#04x}")]
    BadPrefix(u8),
    #[error("unknown serial packet kind {0:#04x}")]
    UnknownKind(u8),
    #[error("declared body size {declared} exceeds the {available} bytes present")]
    Truncated { declared: usize, available: usize },
    #[error("unicast body too short for its destination field")]
    UnicastTooShort,
}

/// A parsed host-to-device frame. Views borrow the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestFrame<'a> {
    /// A complete FLOC frame to put on the air as-is.
    Broadcast { floc: &'a [u8] },
    /// Reserved: a body with an explicit destination device.
    Unicast { dest_addr: u16, body: &'a [u8] },
}

/// Parse a `$`-prefixed frame from the supervisory host.
pub fn parse_host_frame(buf: &[u8]) -> Result<NestFrame<'_>, NestError> {
    if buf.len() < SERIAL_ENVELOPE_SIZE {
        return Err(NestError::TooShort(buf.len()));
    }
    if buf[0] != HOST_TO_DEVICE_PREFIX {
        return Err(NestError::BadPrefix(buf[0]));
    }

    let kind = buf[1];
    let size = buf[2] as usize;
    let body = &buf[SERIAL_ENVELOPE_SIZE..];
    if body.len() < size {
        return Err(NestError::Truncated {
            declared: size,
            available: body.len(),
        });
    }
    let body = &body[..size];

    match kind {
        KIND_BROADCAST => Ok(NestFrame::Broadcast { floc: body }),
        KIND_UNICAST => {
            if body.len() < 2 {
                return Err(NestError::UnicastTooShort);
            }
            Ok(NestFrame::Unicast {
                dest_addr: u16::from_be_bytes([body[0], body[1]]),
                body: &body[2..],
            })
        }
        other => Err(NestError::UnknownKind(other)),
    }
}

/// Wrap a received FLOC frame for delivery to the supervisory host.
pub fn encode_host_frame(floc: &[u8]) -> Vec<u8> {
    debug_assert!(floc.len() <= u8::MAX as usize);
    let mut out = Vec::with_capacity(SERIAL_ENVELOPE_SIZE + floc.len());
    out.push(DEVICE_TO_HOST_PREFIX);
    out.push(KIND_BROADCAST);
    out.push(floc.len() as u8);
    out.extend_from_slice(floc);
    out
}
