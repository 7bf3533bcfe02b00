// Transport-side delivery registry: connection ids to outbound channels.

use crate::interface_adapters::protocol::ServerMessage;
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Owns the outbound half of every live connection.
///
/// Pure transport: envelopes are serialized once and the shared bytes fanned
/// out; room state is never inspected here. The registry lives on the
/// coordinator task, so access needs no lock.
#[derive(Debug, Default)]
pub struct Gateway {
    conns: HashMap<u64, mpsc::Sender<Utf8Bytes>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, conn_id: u64, outbound: mpsc::Sender<Utf8Bytes>) {
        self.conns.insert(conn_id, outbound);
    }

    pub fn unregister(&mut self, conn_id: u64) {
        self.conns.remove(&conn_id);
    }

    /// Delivers one message to one connection.
    pub fn unicast(&self, conn_id: u64, msg: &ServerMessage) {
        let Some(bytes) = encode(msg) else { return };
        self.deliver(conn_id, bytes);
    }

    /// Serializes once and clones the shared bytes to every target.
    pub fn broadcast(&self, targets: impl IntoIterator<Item = u64>, msg: &ServerMessage) {
        let Some(bytes) = encode(msg) else { return };
        for conn_id in targets {
            self.deliver(conn_id, bytes.clone());
        }
    }

    fn deliver(&self, conn_id: u64, bytes: Utf8Bytes) {
        let Some(tx) = self.conns.get(&conn_id) else {
            debug!(conn_id, "delivery target not registered; dropping message");
            return;
        };
        match tx.try_send(bytes) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                // A slow client must never stall the coordinator.
                warn!(conn_id, "outbound queue full; dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(conn_id, "outbound channel closed; dropping message");
            }
        }
    }
}

fn encode(msg: &ServerMessage) -> Option<Utf8Bytes> {
    match serde_json::to_string(msg) {
        Ok(txt) => Some(Utf8Bytes::from(txt)),
        Err(e) => {
            error!(error = ?e, "failed to serialize server message");
            None
        }
    }
}
