use std::{env, time::Duration};

// Runtime/server constants (not gameplay tuning).

pub fn http_port() -> u16 {
    env::var("SESSION_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3003)
}

pub fn battle_royale_capacity() -> usize {
    env::var("BATTLE_ROYALE_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v >= 2)
        .unwrap_or(8)
}

pub fn cooperative_capacity() -> usize {
    env::var("COOPERATIVE_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v >= 2)
        .unwrap_or(4)
}

// Stats reporting stays disabled unless a collaborator URL is configured.
pub fn stats_service_url() -> Option<String> {
    env::var("STATS_SERVICE_URL")
        .ok()
        .filter(|v| !v.trim().is_empty())
}

pub fn stats_report_timeout() -> Duration {
    let millis = env::var("STATS_REPORT_TIMEOUT_MS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(1500);
    Duration::from_millis(millis)
}

pub const EVENT_CHANNEL_CAPACITY: usize = 1024;
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 128;

pub const MATCH_COUNTDOWN: Duration = Duration::from_secs(5);
pub const TICK_INTERVAL: Duration = Duration::from_millis(150);
// Finished rooms linger so trailing broadcasts flush before removal.
pub const FINISHED_ROOM_GRACE: Duration = Duration::from_secs(10);

pub const GRID_WIDTH: u16 = 20;
pub const GRID_HEIGHT: u16 = 20;
