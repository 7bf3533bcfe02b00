// Wire protocol DTOs for the realtime session channel.
// Every frame is a tagged envelope: {"type": "<event>", "data": {...}}.

use crate::domain::{ArenaState, GridPoint, Mode, PlayerSession, Room};
use serde::{Deserialize, Serialize};

/// Messages clients send over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    // Entry point into matchmaking.
    Join(JoinPayload),
    // Marks the sender ready in the lobby.
    Ready,
    // Client-reported geometry/score update during a match.
    Move(MovePayload),
    // The sender consumed the food.
    FoodEaten(FoodEatenPayload),
    // The sender reports its own elimination.
    GameOver(GameOverPayload),
    // Room-wide chat line.
    Chat(ChatPayload),
    // Leaves the current room without closing the connection.
    Leave,
}

/// Payload for the join handshake; the mode tag is validated here, at the
/// boundary, before anything reaches room logic.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub mode: Mode,
}

/// Client-reported movement. Both fields are optional so clients can report
/// geometry and score independently.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    #[serde(default)]
    pub geometry: Option<Vec<GridPoint>>,
    #[serde(default)]
    pub score: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FoodEatenPayload {
    #[serde(default = "default_food_points")]
    pub points: u32,
}

fn default_food_points() -> u32 {
    10
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameOverPayload {
    #[serde(default)]
    pub score: Option<u32>,
    /// Peer ids the reporting client already saw eliminated.
    #[serde(default)]
    pub eliminated_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub text: String,
}

/// Messages the server sends to room members.
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    // Direct answer to a join: the room the sender landed in.
    JoinedRoom {
        room_id: String,
        player_id: String,
        players: Vec<PlayerDto>,
        arena: ArenaDto,
    },
    // A new participant entered the sender's waiting room.
    PlayerJoined {
        player: PlayerDto,
        players: Vec<PlayerDto>,
    },
    PlayerReady {
        player_id: String,
    },
    // Roster is full; the pre-match countdown is running.
    MatchFound {
        room_id: String,
        players: Vec<PlayerDto>,
        countdown: u32,
    },
    GameStarted {
        room_id: String,
    },
    // Consolidated arena snapshot, sent every tick while playing.
    Tick(TickDto),
    PlayerMoved {
        player_id: String,
        geometry: Vec<GridPoint>,
        score: u32,
    },
    FoodSpawned {
        food: GridPoint,
        player_id: String,
        score: u32,
    },
    PlayerEliminated {
        player_id: String,
        name: String,
        final_score: u32,
    },
    GameEnded {
        winner: Option<PlayerSummaryDto>,
        standings: Vec<PlayerSummaryDto>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<&'static str>,
    },
    Chat {
        player_id: String,
        name: String,
        text: String,
        timestamp: u64,
    },
    PlayerLeft {
        player_id: String,
        name: String,
        remaining: usize,
    },
    PlayerDisconnected {
        player_id: String,
        name: String,
    },
}

/// Full participant state for lobby and tick snapshots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerDto {
    pub id: String,
    pub name: String,
    pub score: u32,
    pub color: String,
    pub ready: bool,
    pub geometry: Vec<GridPoint>,
}

impl From<&PlayerSession> for PlayerDto {
    fn from(session: &PlayerSession) -> Self {
        Self {
            id: session.id.to_string(),
            name: session.display_name.clone(),
            score: session.score,
            color: session.color.clone(),
            ready: session.ready,
            geometry: session.geometry.clone(),
        }
    }
}

/// Reduced participant state for final standings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummaryDto {
    pub id: String,
    pub name: String,
    pub score: u32,
}

impl From<&PlayerSession> for PlayerSummaryDto {
    fn from(session: &PlayerSession) -> Self {
        Self {
            id: session.id.to_string(),
            name: session.display_name.clone(),
            score: session.score,
        }
    }
}

/// Arena parameters sent on join and with every tick.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArenaDto {
    pub food: GridPoint,
    pub obstacles: Vec<GridPoint>,
    pub grid_width: u16,
    pub grid_height: u16,
    pub tick_ms: u64,
}

impl From<&ArenaState> for ArenaDto {
    fn from(arena: &ArenaState) -> Self {
        Self {
            food: arena.food,
            obstacles: arena.obstacles.clone(),
            grid_width: arena.grid_width,
            grid_height: arena.grid_height,
            tick_ms: arena.tick_ms,
        }
    }
}

/// Consolidated per-tick snapshot of one room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickDto {
    pub tick: u64,
    pub food: GridPoint,
    pub obstacles: Vec<GridPoint>,
    pub players: Vec<PlayerDto>,
}

impl From<&Room> for TickDto {
    fn from(room: &Room) -> Self {
        Self {
            tick: room.tick,
            food: room.arena.food,
            obstacles: room.arena.obstacles.clone(),
            players: room.roster.values().map(PlayerDto::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_envelope_parses_with_kebab_case_mode() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"join","data":{"displayName":"alice","mode":"battle-royale"}}"#,
        )
        .expect("valid join");
        match msg {
            ClientMessage::Join(payload) => {
                assert_eq!(payload.display_name, "alice");
                assert_eq!(payload.mode, Mode::BattleRoyale);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn join_defaults_to_duel_when_mode_is_missing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","data":{"displayName":"bob"}}"#)
                .expect("valid join");
        match msg {
            ClientMessage::Join(payload) => assert_eq!(payload.mode, Mode::Duel),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unit_events_need_no_data_field() {
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ready"}"#),
            Ok(ClientMessage::Ready)
        ));
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"leave"}"#),
            Ok(ClientMessage::Leave)
        ));
    }

    #[test]
    fn partial_move_keeps_absent_fields_unset() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"move","data":{"score":12}}"#).expect("valid move");
        match msg {
            ClientMessage::Move(payload) => {
                assert!(payload.geometry.is_none());
                assert_eq!(payload.score, Some(12));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_types_are_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"teleport","data":{}}"#).is_err());
    }

    #[test]
    fn game_ended_omits_reason_unless_present() {
        let ended = ServerMessage::GameEnded {
            winner: None,
            standings: Vec::new(),
            reason: None,
        };
        let json = serde_json::to_value(&ended).expect("serializes");
        assert_eq!(json["type"], "game-ended");
        assert!(json["data"].get("reason").is_none());
        assert!(json["data"]["winner"].is_null());

        let ended = ServerMessage::GameEnded {
            winner: None,
            standings: Vec::new(),
            reason: Some("disconnected"),
        };
        let json = serde_json::to_value(&ended).expect("serializes");
        assert_eq!(json["data"]["reason"], "disconnected");
    }

    #[test]
    fn tick_envelope_uses_camel_case_fields() {
        let arena = ArenaState {
            food: GridPoint { x: 3, y: 4 },
            obstacles: Vec::new(),
            grid_width: 20,
            grid_height: 20,
            tick_ms: 150,
        };
        let mut room = Room::new(std::sync::Arc::from("room-9"), Mode::Duel, arena);
        room.roster.insert(
            1,
            PlayerSession::new(
                1,
                "alice".to_string(),
                "hsl(10, 70%, 50%)".to_string(),
                GridPoint { x: 10, y: 10 },
            ),
        );
        room.tick = 5;

        let json =
            serde_json::to_value(ServerMessage::Tick(TickDto::from(&room))).expect("serializes");
        assert_eq!(json["type"], "tick");
        assert_eq!(json["data"]["tick"], 5);
        assert_eq!(json["data"]["food"]["x"], 3);
        assert_eq!(json["data"]["players"][0]["name"], "alice");
        assert_eq!(json["data"]["players"][0]["score"], 0);
    }
}
