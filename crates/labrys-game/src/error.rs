//! Error types for the game layer.

use labrys_core::{CodecError, SessionError};
use thiserror::Error;

/// Game layer errors
#[derive(Debug, Error)]
pub enum GameError {
    /// A move was attempted before any snapshot arrived, so the player's
    /// position is unknown
    #[error("no game state received yet")]
    NoKnownState,

    /// Session engine failure
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Game codec failure
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
