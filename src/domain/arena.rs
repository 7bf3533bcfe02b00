// Shared arena state and food placement.

use crate::domain::session::GridPoint;
use rand::Rng;
use std::collections::HashSet;

// Rejection-sampling budget before falling back to a free-cell scan.
const MAX_PLACEMENT_ATTEMPTS: u32 = 64;

/// Shared world data broadcast to a room on every tick.
#[derive(Debug, Clone)]
pub struct ArenaState {
    pub food: GridPoint,
    pub obstacles: Vec<GridPoint>,
    pub grid_width: u16,
    pub grid_height: u16,
    /// Tick interval in milliseconds, echoed to clients so they can pace
    /// their local loop.
    pub tick_ms: u64,
}

impl ArenaState {
    pub fn new<R: Rng>(rng: &mut R, grid_width: u16, grid_height: u16, tick_ms: u64) -> Self {
        let food = random_cell(rng, grid_width, grid_height);
        Self {
            food,
            obstacles: Vec::new(),
            grid_width,
            grid_height,
            tick_ms,
        }
    }
}

fn random_cell<R: Rng>(rng: &mut R, width: u16, height: u16) -> GridPoint {
    GridPoint {
        x: rng.random_range(0..width),
        y: rng.random_range(0..height),
    }
}

/// Picks a fresh food cell, uniformly at random, avoiding `occupied`.
///
/// Bounded rejection sampling first; when the budget runs out, a uniform
/// pick among the remaining free cells. Returns `None` only when the grid
/// has no free cell at all.
pub fn place_food<R: Rng>(
    rng: &mut R,
    width: u16,
    height: u16,
    occupied: &HashSet<GridPoint>,
) -> Option<GridPoint> {
    for _ in 0..MAX_PLACEMENT_ATTEMPTS {
        let cell = random_cell(rng, width, height);
        if !occupied.contains(&cell) {
            return Some(cell);
        }
    }

    let free: Vec<GridPoint> = (0..width)
        .flat_map(|x| (0..height).map(move |y| GridPoint { x, y }))
        .filter(|cell| !occupied.contains(cell))
        .collect();
    if free.is_empty() {
        None
    } else {
        Some(free[rng.random_range(0..free.len())])
    }
}
