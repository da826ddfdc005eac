//! Record framing for the wire protocol.
//!
//! One datagram carries exactly one record: a single leading type byte
//! followed by an opaque body. The framing layer never inspects bodies;
//! encryption and payload parsing live above it.

use crate::error::RecordError;

/// Wire record type codes.
///
/// Types are opaque integers, not a bitmask: the application plane reuses
/// numbers (the game layer's 10 and 11) that overlap the bit patterns of
/// the control codes, so these must never be tested with `&`.
pub mod record_type {
    /// First and second client hello of the handshake
    pub const CLIENT_HELLO: u8 = 1;
    /// Server's stateless-cookie challenge
    pub const HELLO_VERIFY: u8 = 2;
    /// Server's session grant
    pub const SERVER_HELLO: u8 = 4;
    /// Latency probe
    pub const PING: u8 = 8;
    /// Latency probe response
    pub const PONG: u8 = 16;
}

/// Smallest datagram the engine will consider: type byte plus a body that
/// can hold anything at all.
pub const MIN_DATAGRAM_SIZE: usize = 3;

/// A framed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record type code
    pub record_type: u8,
    /// Opaque body bytes
    pub body: Vec<u8>,
}

/// Frame a record for the wire: `[type] || body`
#[must_use]
pub fn encode(record_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(record_type);
    out.extend_from_slice(body);
    out
}

/// Parse a datagram into a record.
///
/// # Errors
///
/// Returns [`RecordError::BodyTooShort`] when the payload cannot contain
/// both a type byte and a non-empty body.
pub fn decode(payload: &[u8]) -> Result<Record, RecordError> {
    if payload.len() < 2 {
        return Err(RecordError::BodyTooShort {
            actual: payload.len(),
        });
    }

    Ok(Record {
        record_type: payload[0],
        body: payload[1..].to_vec(),
    })
}
