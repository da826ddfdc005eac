//! The byte-level encoding of game entities.
//!
//! The session layer ships these bodies as opaque payloads; only this seam
//! knows their shape.

use labrys_core::CodecError;

use crate::state::{Action, GameState};

/// Codec seam for the game plane
pub trait GameCodec: Send + Sync {
    /// Encode a move action
    fn encode_action(&self, action: &Action) -> Result<Vec<u8>, CodecError>;
    /// Decode a move action
    fn decode_action(&self, bytes: &[u8]) -> Result<Action, CodecError>;
    /// Encode a state snapshot
    fn encode_state(&self, state: &GameState) -> Result<Vec<u8>, CodecError>;
    /// Decode a state snapshot
    fn decode_state(&self, bytes: &[u8]) -> Result<GameState, CodecError>;
}

/// Bincode implementation of the game codec
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeGameCodec;

impl GameCodec for BincodeGameCodec {
    fn encode_action(&self, action: &Action) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(action).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_action(&self, bytes: &[u8]) -> Result<Action, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn encode_state(&self, state: &GameState) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(state).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode_state(&self, bytes: &[u8]) -> Result<GameState, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
