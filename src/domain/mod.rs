// Domain layer: arena, sessions and the room state machine.

pub mod arena;
pub mod room;
pub mod session;

pub use arena::{ArenaState, place_food};
pub use room::{Mode, Room, RoomStatus};
pub use session::{GridPoint, PlayerSession};
