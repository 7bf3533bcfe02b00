use crate::use_cases::SessionEvent;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct AppState {
    // Events flowing from sockets into the coordinator task.
    pub events_tx: mpsc::Sender<SessionEvent>,
    // Queue depth for each connection's outbound delivery channel.
    pub outbound_capacity: usize,
}
