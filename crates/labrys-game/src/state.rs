//! Game entities exchanged with the maze server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compass direction of a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Towards row 0
    North,
    /// Away from row 0
    South,
    /// Away from column 0
    East,
    /// Towards column 0
    West,
}

/// Position of a cell in the maze grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    /// Row index
    pub row: i32,
    /// Column index
    pub col: i32,
}

/// One maze cell: four walls and an uncollected reward
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Wall towards row - 1
    pub north_wall: bool,
    /// Wall towards row + 1
    pub south_wall: bool,
    /// Wall towards col + 1
    pub east_wall: bool,
    /// Wall towards col - 1
    pub west_wall: bool,
    /// Reward still sitting in this cell
    pub reward: i32,
}

/// The maze grid, rows of cells
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Maze {
    /// Row-major grid
    pub grid: Vec<Vec<Cell>>,
}

impl Maze {
    /// Number of rows
    #[must_use]
    pub fn height(&self) -> usize {
        self.grid.len()
    }

    /// Number of columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.grid.first().map_or(0, Vec::len)
    }
}

/// A player in the maze
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Stable player identity
    pub id: Uuid,
    /// Current cell
    pub pos: Pos,
    /// Collected reward
    pub reward: i32,
}

/// Server-stamped snapshot of the whole game.
///
/// `version` increases monotonically on the server; the reconciler drops
/// any snapshot whose version is not strictly greater than the cached one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    /// Monotonic snapshot version
    pub version: i64,
    /// The maze
    pub maze: Maze,
    /// All players
    pub players: Vec<Player>,
}

impl GameState {
    /// Look up a player by id
    #[must_use]
    pub fn player(&self, id: Uuid) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }
}

/// A move the client proposes to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Acting player
    pub id: Uuid,
    /// Requested direction
    pub direction: Direction,
    /// The cell the player believes it occupies
    pub from: Pos,
}
