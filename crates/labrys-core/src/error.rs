//! Error types for the labrys session protocol.

use thiserror::Error;

/// Record framing faults.
///
/// These are never fatal: the engine logs the offending datagram and keeps
/// listening, because UDP is lossy and garbage can arrive interleaved with
/// legitimate traffic.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Payload too small to contain a type byte and a body
    #[error("payload too short to contain a record body: {actual} bytes")]
    BodyTooShort {
        /// Actual payload size
        actual: usize,
    },

    /// Datagram below the protocol minimum
    #[error("datagram below minimum record size: {actual} bytes")]
    BelowMinimumSize {
        /// Actual datagram size
        actual: usize,
    },

    /// Datagram larger than the configured read buffer
    #[error("datagram exceeds read buffer: {actual} > {limit} bytes")]
    ExceedsReadBuffer {
        /// Actual datagram size
        actual: usize,
        /// Configured ceiling
        limit: usize,
    },
}

/// Wire codec faults
#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),

    /// Bytes could not be decoded into the expected payload
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Session engine errors surfaced to callers
#[derive(Debug, Error)]
pub enum SessionError {
    /// No established session; the handshake has not completed
    #[error("session not established")]
    NotEstablished,

    /// Cryptographic failure
    #[error("crypto error: {0}")]
    Crypto(#[from] labrys_crypto::CryptoError),

    /// Codec failure
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Socket I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
