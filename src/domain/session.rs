// Per-connection participant state.

use serde::{Deserialize, Serialize};

/// One cell on the arena grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPoint {
    pub x: u16,
    pub y: u16,
}

/// Ephemeral record for one connected participant.
///
/// Trust-client boundary: geometry and score arrive from the owning
/// connection and are stored verbatim; the server validates neither movement
/// nor collisions. Only events from the owning connection mutate a session.
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: u64,
    pub display_name: String,
    pub score: u32,
    pub color: String,
    pub ready: bool,
    /// Client-reported snake body, head first.
    pub geometry: Vec<GridPoint>,
}

impl PlayerSession {
    pub fn new(id: u64, display_name: String, color: String, spawn: GridPoint) -> Self {
        Self {
            id,
            display_name,
            score: 0,
            color,
            ready: false,
            geometry: vec![spawn],
        }
    }
}
