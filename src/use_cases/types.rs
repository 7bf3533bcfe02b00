// Use-case level inputs for the coordinator task.

use crate::interface_adapters::protocol::ClientMessage;
use axum::extract::ws::Utf8Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;

/// How a connection left its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Explicit `leave` event; the connection stays open.
    Left,
    /// Transport loss; the connection is gone.
    Disconnected,
}

/// Everything that can wake the coordinator: gateway traffic and room
/// timers. Funneling both through one channel keeps all room mutation on a
/// single task.
#[derive(Debug)]
pub enum SessionEvent {
    Connected {
        conn_id: u64,
        outbound: mpsc::Sender<Utf8Bytes>,
    },
    Inbound {
        conn_id: u64,
        message: ClientMessage,
    },
    Disconnected {
        conn_id: u64,
    },
    CountdownElapsed {
        room_id: Arc<str>,
    },
    TickFired {
        room_id: Arc<str>,
    },
    CleanupElapsed {
        room_id: Arc<str>,
    },
}
