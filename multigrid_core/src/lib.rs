use serde::{Deserialize, Serialize};

pub mod map;
pub mod policy;
pub mod world;

/// Unique identifier for agents, assigned by construction order.
pub type AgentId = usize;

/// Represents a 2D grid coordinate.
///
/// `x` is the column index and `y` is the row index, both 0-based.
/// In the textual map format, row `y` is the `y`-th string and `x` is the
/// character index within that string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Identity tag for an agent. The agent's goal cell carries the same color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentColor {
    Red,
    Green,
    Blue,
    Purple,
    Yellow,
    Grey,
    Black,
}

impl AgentColor {
    /// All colors in assignment order, used when the caller does not pick
    /// colors explicitly. Worlds with more agents than colors cycle through
    /// the palette again.
    pub const PALETTE: [AgentColor; 7] = [
        AgentColor::Red,
        AgentColor::Green,
        AgentColor::Blue,
        AgentColor::Purple,
        AgentColor::Yellow,
        AgentColor::Grey,
        AgentColor::Black,
    ];
}
