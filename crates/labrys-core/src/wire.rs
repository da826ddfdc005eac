//! Control-record payloads and the codec seam.
//!
//! The session engine parses exactly three payload shapes: the handshake
//! record (shared by both ClientHellos, HelloVerify and ServerHello), the
//! ping, and the pong. Everything else on the wire is opaque to it.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Handshake payload.
///
/// The same shape travels in all four handshake messages; which fields are
/// populated depends on the hop. `random` is fixed from the first
/// ClientHello through the successful ServerHello.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    /// Server-assigned session identifier; empty until ServerHello
    pub session_id: Vec<u8>,
    /// 32-byte client nonce, stable across the whole handshake
    pub random: Vec<u8>,
    /// Opaque server cookie, echoed verbatim on the second ClientHello
    pub cookie: Vec<u8>,
    /// Auth token, symmetrically pre-wrapped (second ClientHello only)
    pub token: Vec<u8>,
    /// Client symmetric session key
    pub key: Vec<u8>,
    /// Client wall-clock milliseconds (second ClientHello only)
    pub timestamp: i64,
}

/// Latency probe payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Client wall-clock milliseconds at send time
    pub sent_at: i64,
}

/// Latency probe response payload; all stamps are milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Echo of the ping's `sent_at`
    pub ping_sent_at: i64,
    /// When the server saw the ping
    pub received_at: i64,
    /// When the server sent this pong
    pub sent_at: i64,
}

/// Bidirectional serializer for the control records.
///
/// The engine goes through this seam so the body encoding can be swapped
/// without touching protocol logic.
pub trait WireCodec: Send + Sync {
    /// Encode a handshake payload
    fn encode_handshake(&self, handshake: &Handshake) -> Result<Vec<u8>, CodecError>;
    /// Decode a handshake payload
    fn decode_handshake(&self, bytes: &[u8]) -> Result<Handshake, CodecError>;
    /// Encode a ping payload
    fn encode_ping(&self, ping: &Ping) -> Result<Vec<u8>, CodecError>;
    /// Decode a ping payload
    fn decode_ping(&self, bytes: &[u8]) -> Result<Ping, CodecError>;
    /// Encode a pong payload
    fn encode_pong(&self, pong: &Pong) -> Result<Vec<u8>, CodecError>;
    /// Decode a pong payload
    fn decode_pong(&self, bytes: &[u8]) -> Result<Pong, CodecError>;
}

/// Bincode implementation of the codec seam
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl WireCodec for BincodeCodec {
    fn encode_handshake(&self, handshake: &Handshake) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(handshake).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_handshake(&self, bytes: &[u8]) -> Result<Handshake, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_ping(&self, ping: &Ping) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(ping).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_ping(&self, bytes: &[u8]) -> Result<Ping, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_pong(&self, pong: &Pong) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(pong).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_pong(&self, bytes: &[u8]) -> Result<Pong, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
