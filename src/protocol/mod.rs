//! FLOC wire protocol: packet types, codec, and the duplicate filter.
//!
//! Everything in this module is pure state and arithmetic, with no I/O and
//! no clock reads, so the node logic above it stays testable byte-for-byte.
//!
//! ## Module Organization
//!
//! - `types`: header/body/packet definitions and frame-size constants
//! - `codec`: bit-exact encode/decode with explicit shifts and masks
//! - `bloom`: the two-hash duplicate-suppression filter

pub mod bloom;
pub mod codec;
pub mod types;

pub use bloom::{BLOOM_RESET_INTERVAL, DuplicateFilter};
pub use codec::{CodecError, decode_body, decode_frame, decode_header, encode_frame};
pub use types::{
    BROADCAST_ADDR, CommandType, FLOC_HEADER_SIZE, FLOC_MAX_SIZE, FlocBody, FlocHeader,
    FlocPacket, FlocPacketType, FlocPayload, MAX_COMMAND_PAYLOAD, MAX_DATA_PAYLOAD,
    MAX_RESPONSE_PAYLOAD, TTL_START,
};
