// WebSocket endpoint: accepts connections, validates envelopes at the
// boundary, and shuttles events between each socket and the coordinator.

use crate::interface_adapters::protocol::ClientMessage;
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::ids::next_id;
use crate::use_cases::SessionEvent;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    EventsClosed,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const MAX_DISPLAY_NAME_LEN: usize = 32;

enum LoopControl {
    Continue,
    Disconnect,
}

struct ConnCtx {
    msgs_in: u64,
    msgs_out: u64,
    bytes_in: u64,
    bytes_out: u64,

    invalid_json: u32,

    last_invalid_log: Instant,
    last_move_drop_log: Instant,

    close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    fn new() -> Self {
        let throttled = Instant::now() - LOG_THROTTLE;
        Self {
            msgs_in: 0,
            msgs_out: 0,
            bytes_in: 0,
            bytes_out: 0,
            invalid_json: 0,
            last_invalid_log: throttled,
            last_move_drop_log: throttled,
            close_frame: None,
        }
    }
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        // One id per transport connection, minted before any traffic so the
        // whole lifecycle shares a log span.
        let conn_id = next_id();
        let span = info_span!("conn", conn_id);
        handle_socket(socket, state, conn_id).instrument(span)
    })
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, conn_id: u64) {
    // Register delivery with the coordinator before the first read so no
    // outbound event addressed to this connection can be missed.
    let (outbound_tx, outbound_rx) = mpsc::channel::<Utf8Bytes>(state.outbound_capacity);
    let connected = SessionEvent::Connected {
        conn_id,
        outbound: outbound_tx,
    };
    if state.events_tx.send(connected).await.is_err() {
        warn!("coordinator unavailable; rejecting connection");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::RESTART,
                reason: "server unavailable".into(),
            })))
            .await;
        let _ = socket.close().await;
        return;
    }
    info!("client connected");

    let mut ctx = ConnCtx::new();
    if let Err(e) = run_client_loop(&mut socket, conn_id, &state.events_tx, outbound_rx, &mut ctx).await
    {
        warn!(error = ?e, "client loop exited with error");
    }

    // Transport loss is signalled exactly once, before the outbound half of
    // this connection is released.
    if state
        .events_tx
        .send(SessionEvent::Disconnected { conn_id })
        .await
        .is_err()
    {
        debug!("coordinator already gone during disconnect");
    }

    debug!(
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        "connection stats"
    );
    info!("client disconnected");
}

async fn run_client_loop(
    socket: &mut WebSocket,
    conn_id: u64,
    events_tx: &mpsc::Sender<SessionEvent>,
    mut outbound_rx: mpsc::Receiver<Utf8Bytes>,
    ctx: &mut ConnCtx,
) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let disconnect: bool = tokio::select! {
            // Incoming frame from the client.
            incoming = socket.recv() => {
                match handle_incoming(incoming, conn_id, events_tx, ctx).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Outbound delivery from the coordinator.
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(bytes) => match forward_outbound(bytes, socket, ctx).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    None => {
                        // The coordinator dropped our delivery handle.
                        ctx.close_frame = Some(CloseFrame {
                            code: close_code::NORMAL,
                            reason: "session closed".into(),
                        });
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    match fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

async fn handle_incoming(
    incoming: Option<Result<Message, axum::Error>>,
    conn_id: u64,
    events_tx: &mpsc::Sender<SessionEvent>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(Message::Text(text))) => {
            ctx.msgs_in += 1;
            ctx.bytes_in += text.len() as u64;

            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => forward_client_message(conn_id, message, events_tx, ctx).await,
                Err(parse_err) => {
                    ctx.invalid_json += 1;
                    if should_log(&mut ctx.last_invalid_log) {
                        warn!(
                            bytes = text.len(),
                            error = %parse_err,
                            "failed to parse client message"
                        );
                    }

                    if ctx.invalid_json > MAX_INVALID_JSON {
                        ctx.close_frame = Some(CloseFrame {
                            code: close_code::POLICY,
                            reason: "too many invalid messages".into(),
                        });
                        return Ok(LoopControl::Disconnect);
                    }
                    Ok(LoopControl::Continue)
                }
            }
        }
        Some(Ok(Message::Binary(_))) => {
            ctx.close_frame = Some(CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: "binary messages not supported".into(),
            });
            Ok(LoopControl::Disconnect)
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_))) => Ok(LoopControl::Continue),
        Some(Ok(Message::Close(_))) => Ok(LoopControl::Disconnect),
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

// Joins are normalized at the boundary; move reports may be shed under
// backpressure; everything else must reach the coordinator.
async fn forward_client_message(
    conn_id: u64,
    message: ClientMessage,
    events_tx: &mpsc::Sender<SessionEvent>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    let message = match message {
        ClientMessage::Join(mut payload) => {
            payload.display_name = sanitize_display_name(&payload.display_name, conn_id);
            ClientMessage::Join(payload)
        }
        ClientMessage::Move(payload) => {
            // Latest-wins data: dropping one report is cheaper than stalling
            // the socket on a full channel.
            let event = SessionEvent::Inbound {
                conn_id,
                message: ClientMessage::Move(payload),
            };
            return match events_tx.try_send(event) {
                Ok(()) => Ok(LoopControl::Continue),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if should_log(&mut ctx.last_move_drop_log) {
                        warn!("event channel full; dropping move report");
                    }
                    Ok(LoopControl::Continue)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(NetError::EventsClosed),
            };
        }
        other => other,
    };

    events_tx
        .send(SessionEvent::Inbound { conn_id, message })
        .await
        .map_err(|_| NetError::EventsClosed)?;
    Ok(LoopControl::Continue)
}

fn sanitize_display_name(raw: &str, conn_id: u64) -> String {
    let name = raw.trim();
    if name.is_empty() || name.len() > MAX_DISPLAY_NAME_LEN {
        return format!("Player-{}", conn_id % 10_000);
    }
    name.to_string()
}

async fn forward_outbound(bytes: Utf8Bytes, socket: &mut WebSocket, ctx: &mut ConnCtx) -> LoopControl {
    let len = bytes.len();
    match socket.send(Message::Text(bytes)).await {
        Ok(()) => {
            ctx.msgs_out += 1;
            ctx.bytes_out += len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Disconnect follows immediately; the coordinator learns about
            // it from the socket task exit.
            warn!(error = %err, "failed to send to client");
            LoopControl::Disconnect
        }
    }
}
