// Room coordination: matchmaking, lifecycle and event dispatch.
//
// One coordinator instance owns the room directory, the connection→room
// index and the gateway delivery registry. It runs on a single task
// (`coordinator_task`) and is reachable only through its event channel, so
// rooms never see concurrent mutation.

use crate::domain::{ArenaState, GridPoint, Mode, PlayerSession, Room, RoomStatus, place_food};
use crate::interface_adapters::clients::stats::{MatchResult, StatsClient};
use crate::interface_adapters::gateway::Gateway;
use crate::interface_adapters::protocol::{
    ArenaDto, ChatPayload, ClientMessage, FoodEatenPayload, GameOverPayload, JoinPayload,
    MovePayload, PlayerDto, PlayerSummaryDto, ServerMessage, TickDto,
};
use crate::interface_adapters::utils::ids::next_id;
use crate::use_cases::room::RoomEntry;
use crate::use_cases::types::{Departure, SessionEvent};

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Tuning for the coordinator and the rooms it creates.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub battle_royale_capacity: usize,
    pub cooperative_capacity: usize,
    /// Pre-match countdown once a roster is full.
    pub countdown: Duration,
    /// Broadcast interval while a room is playing.
    pub tick_interval: Duration,
    /// How long a finished room stays in the directory so trailing
    /// broadcasts can flush.
    pub cleanup_grace: Duration,
    pub grid_width: u16,
    pub grid_height: u16,
}

impl CoordinatorSettings {
    /// Roster size that fills a room of the given mode.
    pub fn capacity(&self, mode: Mode) -> usize {
        match mode {
            Mode::Duel => 2,
            Mode::BattleRoyale => self.battle_royale_capacity,
            Mode::Cooperative => self.cooperative_capacity,
        }
    }
}

/// Why an inbound event was not applied. Resolved locally, logged, and never
/// propagated; a bad event from one room cannot affect another.
#[derive(Debug, PartialEq, Eq)]
enum DispatchError {
    /// Event not valid for the room's current state; dropped.
    Protocol(&'static str),
    /// Event references a room or player that is gone; no-op.
    StateConflict,
}

pub struct Coordinator {
    settings: CoordinatorSettings,
    gateway: Gateway,
    rooms: IndexMap<Arc<str>, RoomEntry>,
    conn_rooms: HashMap<u64, Arc<str>>,
    /// Handed to timer tasks so their firings come back through the channel.
    events_tx: mpsc::Sender<SessionEvent>,
    stats: Option<Arc<StatsClient>>,
    rng: StdRng,
}

impl Coordinator {
    pub fn new(
        settings: CoordinatorSettings,
        events_tx: mpsc::Sender<SessionEvent>,
        stats: Option<Arc<StatsClient>>,
    ) -> Self {
        Self {
            settings,
            gateway: Gateway::new(),
            rooms: IndexMap::new(),
            conn_rooms: HashMap::new(),
            events_tx,
            stats,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { conn_id, outbound } => {
                self.gateway.register(conn_id, outbound);
            }
            SessionEvent::Inbound { conn_id, message } => self.dispatch(conn_id, message),
            SessionEvent::Disconnected { conn_id } => {
                self.gateway.unregister(conn_id);
                if let Err(err) = self.remove_from_room(conn_id, Departure::Disconnected) {
                    debug!(conn_id, ?err, "disconnect for a connection without a room");
                }
            }
            SessionEvent::CountdownElapsed { room_id } => self.on_countdown_elapsed(&room_id),
            SessionEvent::TickFired { room_id } => self.on_tick(&room_id),
            SessionEvent::CleanupElapsed { room_id } => self.on_cleanup(&room_id),
        }
    }

    fn dispatch(&mut self, conn_id: u64, message: ClientMessage) {
        let result = match message {
            ClientMessage::Join(payload) => self.handle_join(conn_id, payload),
            ClientMessage::Ready => self.handle_ready(conn_id),
            ClientMessage::Move(payload) => self.handle_move(conn_id, payload),
            ClientMessage::FoodEaten(payload) => self.handle_food_eaten(conn_id, payload),
            ClientMessage::GameOver(payload) => self.handle_game_over(conn_id, payload),
            ClientMessage::Chat(payload) => self.handle_chat(conn_id, payload),
            ClientMessage::Leave => self.remove_from_room(conn_id, Departure::Left),
        };
        match result {
            Ok(()) => {}
            Err(DispatchError::Protocol(reason)) => {
                warn!(conn_id, reason, "client event dropped");
            }
            Err(DispatchError::StateConflict) => {
                debug!(conn_id, "event for a missing room or player; ignoring");
            }
        }
    }

    /// Matchmaking: first waiting room of the requested mode with space, in
    /// directory insertion order; otherwise a fresh room.
    fn handle_join(&mut self, conn_id: u64, payload: JoinPayload) -> Result<(), DispatchError> {
        if let Some(existing) = self.conn_rooms.get(&conn_id).cloned() {
            let active = self
                .rooms
                .get(existing.as_ref())
                .is_some_and(|entry| entry.room.status != RoomStatus::Finished);
            if active {
                return Err(DispatchError::Protocol("join while already in a room"));
            }
            // Stale membership in a finished room; detach it and let the
            // join proceed.
            self.conn_rooms.remove(&conn_id);
            if let Some(entry) = self.rooms.get_mut(existing.as_ref()) {
                entry.room.roster.shift_remove(&conn_id);
            }
        }

        let mode = payload.mode;
        let capacity = self.settings.capacity(mode);
        let eligible = self
            .rooms
            .iter()
            .find(|(_, entry)| {
                entry.room.mode == mode
                    && entry.room.status == RoomStatus::Waiting
                    && entry.room.roster.len() < capacity
            })
            .map(|(id, _)| id.clone());
        let room_id = match eligible {
            Some(id) => id,
            None => self.create_room(mode),
        };

        let color = self.random_color();
        let spawn = GridPoint {
            x: self.settings.grid_width / 2,
            y: self.settings.grid_height / 2,
        };
        let session = PlayerSession::new(conn_id, payload.display_name, color, spawn);

        let Some(entry) = self.rooms.get_mut(room_id.as_ref()) else {
            return Err(DispatchError::StateConflict);
        };
        entry.room.roster.insert(conn_id, session.clone());
        self.conn_rooms.insert(conn_id, room_id.clone());

        let players: Vec<PlayerDto> = entry.room.roster.values().map(PlayerDto::from).collect();
        self.gateway.unicast(
            conn_id,
            &ServerMessage::JoinedRoom {
                room_id: room_id.to_string(),
                player_id: conn_id.to_string(),
                players: players.clone(),
                arena: ArenaDto::from(&entry.room.arena),
            },
        );

        let others: Vec<u64> = entry
            .room
            .roster
            .keys()
            .copied()
            .filter(|id| *id != conn_id)
            .collect();
        self.gateway.broadcast(
            others,
            &ServerMessage::PlayerJoined {
                player: PlayerDto::from(&session),
                players: players.clone(),
            },
        );

        if entry.room.roster.len() == capacity {
            // Full roster: announce the match and arm the countdown. The
            // guard inside schedule_countdown keeps redundant triggers from
            // arming a second timer.
            self.gateway.broadcast(
                entry.room.roster.keys().copied(),
                &ServerMessage::MatchFound {
                    room_id: room_id.to_string(),
                    players,
                    countdown: self.settings.countdown.as_secs() as u32,
                },
            );
            entry.schedule_countdown(self.events_tx.clone(), self.settings.countdown);
        }

        info!(conn_id, room_id = %room_id, mode = mode.as_str(), "player joined room");
        Ok(())
    }

    fn handle_ready(&mut self, conn_id: u64) -> Result<(), DispatchError> {
        let room_id = self
            .conn_rooms
            .get(&conn_id)
            .cloned()
            .ok_or(DispatchError::StateConflict)?;
        let entry = self
            .rooms
            .get_mut(room_id.as_ref())
            .ok_or(DispatchError::StateConflict)?;
        let session = entry
            .room
            .roster
            .get_mut(&conn_id)
            .ok_or(DispatchError::StateConflict)?;
        session.ready = true;

        self.gateway.broadcast(
            entry.room.roster.keys().copied(),
            &ServerMessage::PlayerReady {
                player_id: conn_id.to_string(),
            },
        );
        Ok(())
    }

    /// Stores the reported geometry/score verbatim (trust-client boundary)
    /// and relays it to the other members.
    fn handle_move(&mut self, conn_id: u64, payload: MovePayload) -> Result<(), DispatchError> {
        let room_id = self
            .conn_rooms
            .get(&conn_id)
            .cloned()
            .ok_or(DispatchError::StateConflict)?;
        let entry = self
            .rooms
            .get_mut(room_id.as_ref())
            .ok_or(DispatchError::StateConflict)?;
        if entry.room.status != RoomStatus::Playing {
            return Err(DispatchError::Protocol("move outside an active match"));
        }
        let session = entry
            .room
            .roster
            .get_mut(&conn_id)
            .ok_or(DispatchError::StateConflict)?;
        if let Some(geometry) = payload.geometry {
            session.geometry = geometry;
        }
        if let Some(score) = payload.score {
            session.score = score;
        }
        let update = ServerMessage::PlayerMoved {
            player_id: conn_id.to_string(),
            geometry: session.geometry.clone(),
            score: session.score,
        };

        let others: Vec<u64> = entry
            .room
            .roster
            .keys()
            .copied()
            .filter(|id| *id != conn_id)
            .collect();
        self.gateway.broadcast(others, &update);
        Ok(())
    }

    fn handle_food_eaten(
        &mut self,
        conn_id: u64,
        payload: FoodEatenPayload,
    ) -> Result<(), DispatchError> {
        let room_id = self
            .conn_rooms
            .get(&conn_id)
            .cloned()
            .ok_or(DispatchError::StateConflict)?;
        let entry = self
            .rooms
            .get_mut(room_id.as_ref())
            .ok_or(DispatchError::StateConflict)?;
        if entry.room.status != RoomStatus::Playing {
            return Err(DispatchError::Protocol("food-eaten outside an active match"));
        }
        let session = entry
            .room
            .roster
            .get_mut(&conn_id)
            .ok_or(DispatchError::StateConflict)?;
        session.score = session.score.saturating_add(payload.points);
        let score = session.score;

        let occupied = entry.room.occupied_cells();
        match place_food(
            &mut self.rng,
            entry.room.arena.grid_width,
            entry.room.arena.grid_height,
            &occupied,
        ) {
            Some(cell) => entry.room.arena.food = cell,
            // Only reachable on a fully occupied grid.
            None => debug!(room_id = %room_id, "no free cell; food stays in place"),
        }

        self.gateway.broadcast(
            entry.room.roster.keys().copied(),
            &ServerMessage::FoodSpawned {
                food: entry.room.arena.food,
                player_id: conn_id.to_string(),
                score,
            },
        );
        Ok(())
    }

    /// A participant reports its own elimination. The match ends once at
    /// most one participant is left standing.
    fn handle_game_over(
        &mut self,
        conn_id: u64,
        payload: GameOverPayload,
    ) -> Result<(), DispatchError> {
        let room_id = self
            .conn_rooms
            .get(&conn_id)
            .cloned()
            .ok_or(DispatchError::StateConflict)?;
        let entry = self
            .rooms
            .get_mut(room_id.as_ref())
            .ok_or(DispatchError::StateConflict)?;
        if entry.room.status != RoomStatus::Playing {
            return Err(DispatchError::Protocol("game-over outside an active match"));
        }
        let session = entry
            .room
            .roster
            .get_mut(&conn_id)
            .ok_or(DispatchError::StateConflict)?;
        session.ready = false;
        if let Some(score) = payload.score {
            session.score = score;
        }
        let eliminated = ServerMessage::PlayerEliminated {
            player_id: conn_id.to_string(),
            name: session.display_name.clone(),
            final_score: session.score,
        };
        self.gateway
            .broadcast(entry.room.roster.keys().copied(), &eliminated);

        let observed: Vec<u64> = payload
            .eliminated_ids
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect();
        let remaining = entry.room.remaining_after(conn_id, &observed);
        if remaining.len() <= 1 {
            let winner_id = remaining.first().copied();
            self.finish_room(room_id.as_ref(), winner_id, None);
        }
        Ok(())
    }

    fn handle_chat(&mut self, conn_id: u64, payload: ChatPayload) -> Result<(), DispatchError> {
        let room_id = self
            .conn_rooms
            .get(&conn_id)
            .cloned()
            .ok_or(DispatchError::StateConflict)?;
        let entry = self
            .rooms
            .get(room_id.as_ref())
            .ok_or(DispatchError::StateConflict)?;
        let session = entry
            .room
            .roster
            .get(&conn_id)
            .ok_or(DispatchError::StateConflict)?;

        let line = ServerMessage::Chat {
            player_id: conn_id.to_string(),
            name: session.display_name.clone(),
            text: payload.text,
            timestamp: unix_millis(),
        };
        self.gateway
            .broadcast(entry.room.roster.keys().copied(), &line);
        Ok(())
    }

    /// Shared removal path for `leave` events and transport loss. A second
    /// removal for the same connection resolves to a state conflict no-op.
    fn remove_from_room(&mut self, conn_id: u64, departure: Departure) -> Result<(), DispatchError> {
        let room_id = self
            .conn_rooms
            .remove(&conn_id)
            .ok_or(DispatchError::StateConflict)?;
        let Some(entry) = self.rooms.get_mut(room_id.as_ref()) else {
            return Err(DispatchError::StateConflict);
        };
        let status = entry.room.status;
        let Some(session) = entry.room.roster.shift_remove(&conn_id) else {
            return Err(DispatchError::StateConflict);
        };
        let remaining = entry.room.roster.len();
        let mode = entry.room.mode;

        match status {
            RoomStatus::Waiting => {
                if remaining == 0 {
                    self.rooms.shift_remove(room_id.as_ref());
                    info!(conn_id, room_id = %room_id, "empty waiting room removed");
                } else if let Some(entry) = self.rooms.get_mut(room_id.as_ref()) {
                    if remaining < self.settings.capacity(mode) {
                        // Capacity lost before the countdown fired.
                        entry.cancel_countdown();
                    }
                    self.gateway.broadcast(
                        entry.room.roster.keys().copied(),
                        &ServerMessage::PlayerLeft {
                            player_id: conn_id.to_string(),
                            name: session.display_name.clone(),
                            remaining,
                        },
                    );
                }
            }
            RoomStatus::Playing => {
                // No mid-match replacement or reconnection window: any
                // departure while playing ends the match for everyone.
                let mut winner_id = None;
                if let Some(entry) = self.rooms.get(room_id.as_ref()) {
                    if departure == Departure::Left && remaining == 1 {
                        winner_id = entry.room.roster.keys().next().copied();
                    }
                    let announcement = match departure {
                        Departure::Left => ServerMessage::PlayerLeft {
                            player_id: conn_id.to_string(),
                            name: session.display_name.clone(),
                            remaining,
                        },
                        Departure::Disconnected => ServerMessage::PlayerDisconnected {
                            player_id: conn_id.to_string(),
                            name: session.display_name.clone(),
                        },
                    };
                    self.gateway
                        .broadcast(entry.room.roster.keys().copied(), &announcement);
                }
                let reason = match departure {
                    Departure::Left => None,
                    Departure::Disconnected => Some("disconnected"),
                };
                self.finish_room(room_id.as_ref(), winner_id, reason);
            }
            RoomStatus::Finished => {
                // The grace timer will clear the directory entry.
                debug!(conn_id, room_id = %room_id, "departure from finished room");
            }
        }
        Ok(())
    }

    fn on_countdown_elapsed(&mut self, room_id: &Arc<str>) {
        let events_tx = self.events_tx.clone();
        let tick_interval = self.settings.tick_interval;
        let Some(entry) = self.rooms.get_mut(room_id.as_ref()) else {
            debug!(room_id = %room_id, "countdown fired for a missing room");
            return;
        };
        // The one-shot task has completed; clear its slot either way so the
        // room can re-arm later.
        entry.cancel_countdown();

        let capacity = self.settings.capacity(entry.room.mode);
        if entry.room.status != RoomStatus::Waiting || entry.room.roster.len() < capacity {
            debug!(room_id = %room_id, "stale countdown ignored");
            return;
        }

        entry.room.begin_playing();
        entry.start_ticker(events_tx, tick_interval);
        self.gateway.broadcast(
            entry.room.roster.keys().copied(),
            &ServerMessage::GameStarted {
                room_id: room_id.to_string(),
            },
        );
        info!(room_id = %room_id, players = entry.room.roster.len(), "match started");
    }

    /// Relays the consolidated snapshot. The snapshot reflects whatever
    /// events arrived before this firing; there is no cross-player ordering
    /// beyond arrival order.
    fn on_tick(&mut self, room_id: &Arc<str>) {
        let Some(entry) = self.rooms.get_mut(room_id.as_ref()) else {
            return;
        };
        if entry.room.status != RoomStatus::Playing {
            // A tick that was already queued when the match ended.
            debug!(room_id = %room_id, "tick after match end ignored");
            return;
        }
        entry.room.tick += 1;
        let snapshot = ServerMessage::Tick(TickDto::from(&entry.room));
        self.gateway
            .broadcast(entry.room.roster.keys().copied(), &snapshot);
    }

    fn on_cleanup(&mut self, room_id: &Arc<str>) {
        let Some(entry) = self.rooms.shift_remove(room_id.as_ref()) else {
            return;
        };
        // Members that never left keep a stale index entry; clear it unless
        // they already moved on to another room.
        for conn_id in entry.room.roster.keys() {
            if self.conn_rooms.get(conn_id).is_some_and(|id| id == room_id) {
                self.conn_rooms.remove(conn_id);
            }
        }
        info!(room_id = %room_id, "finished room removed after grace period");
    }

    /// Stops the ticker, announces the result, arms the grace timer and
    /// fires stats reports. Only playing rooms can finish.
    fn finish_room(&mut self, room_id: &str, winner_id: Option<u64>, reason: Option<&'static str>) {
        let events_tx = self.events_tx.clone();
        let grace = self.settings.cleanup_grace;
        let stats = self.stats.clone();

        let Some(entry) = self.rooms.get_mut(room_id) else {
            return;
        };
        entry.stop_ticker();
        if !entry.room.finish() {
            return;
        }

        let winner = winner_id
            .and_then(|id| entry.room.roster.get(&id))
            .map(PlayerSummaryDto::from);
        let standings: Vec<PlayerSummaryDto> = entry
            .room
            .roster
            .values()
            .map(PlayerSummaryDto::from)
            .collect();
        self.gateway.broadcast(
            entry.room.roster.keys().copied(),
            &ServerMessage::GameEnded {
                winner,
                standings,
                reason,
            },
        );

        entry.schedule_cleanup(events_tx, grace);
        info!(room_id, winner_id = ?winner_id, reason = ?reason, "match finished");

        // Fire-and-forget persistence; a failure there never touches room
        // lifecycle, and nothing in the tick path ever awaits it.
        if let Some(stats) = stats {
            let duration = entry
                .room
                .started_at
                .map(|started| started.elapsed())
                .unwrap_or_default();
            let mode = entry.room.mode;
            for session in entry.room.roster.values() {
                let client = stats.clone();
                let result = MatchResult {
                    player_id: session.id.to_string(),
                    score: session.score,
                    mode: mode.as_str(),
                    duration_ms: duration.as_millis() as u64,
                };
                tokio::spawn(async move {
                    if let Err(err) = client.report_match_result(&result).await {
                        warn!(player_id = %result.player_id, error = ?err, "failed to report match result");
                    }
                });
            }
        }
    }

    fn create_room(&mut self, mode: Mode) -> Arc<str> {
        let room_id: Arc<str> = Arc::from(format!("room-{}", next_id()).as_str());
        let arena = ArenaState::new(
            &mut self.rng,
            self.settings.grid_width,
            self.settings.grid_height,
            self.settings.tick_interval.as_millis() as u64,
        );
        let room = Room::new(room_id.clone(), mode, arena);
        self.rooms.insert(room_id.clone(), RoomEntry::new(room));
        info!(room_id = %room_id, mode = mode.as_str(), "room created");
        room_id
    }

    fn random_color(&mut self) -> String {
        format!("hsl({}, 70%, 50%)", self.rng.random_range(0..360))
    }
}

/// Drives every room from one task; the directory and each room are only
/// ever touched from here.
pub async fn coordinator_task(
    mut coordinator: Coordinator,
    mut events_rx: mpsc::Receiver<SessionEvent>,
) {
    while let Some(event) = events_rx.recv().await {
        coordinator.handle_event(event);
    }
    info!("event channel closed; coordinator exiting");
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
