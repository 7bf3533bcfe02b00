// Use cases layer: coordination workflows for the session server.

pub mod coordinator;
pub mod room;
pub mod types;

pub use coordinator::{Coordinator, CoordinatorSettings, coordinator_task};
pub use types::{Departure, SessionEvent};
