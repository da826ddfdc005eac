//! # labrys Core
//!
//! Core session protocol for the labrys maze game client.
//!
//! This crate provides:
//! - **Record framing**: one datagram = one record = `type byte || body`
//! - **Control-record codec**: handshake, ping and pong payloads behind a
//!   codec seam
//! - **Session engine**: the DTLS-inspired cookie handshake, the encrypted
//!   record stream, and the in-band latency probe
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                Session engine                  │
//! │  handshake state machine · ping scheduler      │
//! ├───────────────────────────────────────────────┤
//! │          Records (type byte || body)           │
//! ├───────────────────────────────────────────────┤
//! │   AES-256-CBC stream / RSA-OAEP handshake      │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! The engine owns a single connected UDP socket and runs three concurrent
//! activities per connection: a reader, a serial record handler, and the
//! ping scheduler. Decrypted application records surface through the
//! [`SessionEvents`] listener; the maze-game layer above this crate decides
//! what they mean.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod session;
pub mod wire;

pub use error::{CodecError, RecordError, SessionError};
pub use record::{MIN_DATAGRAM_SIZE, Record, record_type};
pub use session::{
    DEFAULT_PING_INTERVAL, DEFAULT_READ_BUFFER_SIZE, Session, SessionConfig, SessionEvents,
    now_millis,
};
pub use wire::{BincodeCodec, Handshake, Ping, Pong, WireCodec};
