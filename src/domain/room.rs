// Room state machine: roster, arena and lifecycle.

use crate::domain::arena::ArenaState;
use crate::domain::session::{GridPoint, PlayerSession};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Game modes a room can host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    #[default]
    Duel,
    BattleRoyale,
    Cooperative,
}

impl Mode {
    /// Stable identifier used in logs and collaborator payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Duel => "duel",
            Mode::BattleRoyale => "battle-royale",
            Mode::Cooperative => "cooperative",
        }
    }
}

/// Room lifecycle. Advances waiting → playing → finished, never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Waiting,
    Playing,
    Finished,
}

/// One game instance: an ordered roster plus shared arena state.
#[derive(Debug)]
pub struct Room {
    pub id: Arc<str>,
    pub mode: Mode,
    pub status: RoomStatus,
    /// Insertion-ordered so snapshots and standings stay stable.
    pub roster: IndexMap<u64, PlayerSession>,
    pub arena: ArenaState,
    /// Broadcast cycles completed while playing.
    pub tick: u64,
    pub created_at: Instant,
    pub started_at: Option<Instant>,
}

impl Room {
    pub fn new(id: Arc<str>, mode: Mode, arena: ArenaState) -> Self {
        Self {
            id,
            mode,
            status: RoomStatus::Waiting,
            roster: IndexMap::new(),
            arena,
            tick: 0,
            created_at: Instant::now(),
            started_at: None,
        }
    }

    /// Moves waiting → playing. Returns false when the room already left the
    /// waiting state.
    pub fn begin_playing(&mut self) -> bool {
        if self.status != RoomStatus::Waiting {
            return false;
        }
        self.status = RoomStatus::Playing;
        self.started_at = Some(Instant::now());
        true
    }

    /// Moves playing → finished. Returns false for any other state.
    pub fn finish(&mut self) -> bool {
        if self.status != RoomStatus::Playing {
            return false;
        }
        self.status = RoomStatus::Finished;
        true
    }

    /// Cells a new food position must avoid: every snake segment, every
    /// obstacle, and the current food.
    pub fn occupied_cells(&self) -> HashSet<GridPoint> {
        let mut occupied: HashSet<GridPoint> = self
            .roster
            .values()
            .flat_map(|session| session.geometry.iter().copied())
            .collect();
        occupied.extend(self.arena.obstacles.iter().copied());
        occupied.insert(self.arena.food);
        occupied
    }

    /// Roster ids still standing once `reporter` and the ids it observed as
    /// eliminated are taken out.
    pub fn remaining_after(&self, reporter: u64, eliminated: &[u64]) -> Vec<u64> {
        self.roster
            .keys()
            .copied()
            .filter(|id| *id != reporter && !eliminated.contains(id))
            .collect()
    }
}
