//! # labrys Game
//!
//! The maze-game layer above the session engine.
//!
//! This crate provides:
//! - **Entities**: maze grid, players, snapshots and move actions
//! - **Game codec**: the byte-level encoding the session layer ships
//!   opaquely
//! - **Reconciler**: [`GameClient`], which serializes moves and keeps only
//!   the newest snapshot by server-stamped version
//!
//! Snapshots arrive over lossy UDP and may be reordered; the reconciler's
//! only job is to make that invisible to the UI: `on_state_change` fires
//! for strictly increasing versions and never for a stale snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod error;
pub mod reconciler;
pub mod state;

pub use codec::{BincodeGameCodec, GameCodec};
pub use error::GameError;
pub use reconciler::{Connection, GameClient, GameCore, GameEvents};
pub use state::{Action, Cell, Direction, GameState, Maze, Player, Pos};

/// Application-plane record type codes.
///
/// These share the session layer's single type byte with the control
/// plane. The numbers do not form a clean bit-flag space with the control
/// codes (10 and 11 overlap their bit patterns), so they are compared as
/// opaque integers only.
pub mod record_types {
    /// Move action sent by the client
    pub const MOVE_ACTION: u8 = 24;
    /// Explicit state request sent by the client
    pub const STATE_REQUEST: u8 = 48;
    /// State snapshot pushed by the server
    pub const GAME_STATE: u8 = 10;
    /// Terminal snapshot marking the end of the game
    pub const GAME_ENDED: u8 = 11;
}
