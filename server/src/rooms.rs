//! The fixed set of ten rooms, their lobby rosters and connections, and
//! every broadcast path. Each room carries its own mutex; the registry
//! itself is immutable after startup. Broadcasts are enqueued under the
//! room lock into bounded per-connection queues and drained by the
//! connection's writer task, so a slow client can never stall the room.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use three_thirteen_protocol::{
    LobbyPlayer, RoomStatus, RoomSummary, ServerToClient,
};

use crate::error::GameError;
use crate::game::{GameState, MAX_PLAYERS, MIN_PLAYERS};

pub const NUM_ROOMS: usize = 10;
pub const MAX_NAME_LEN: usize = 20;
/// Outbound frames buffered per connection; a full queue closes it.
pub const OUTBOUND_QUEUE: usize = 64;

/// One live WebSocket for a player. A second connect under the same
/// player id replaces the handle, which ends the old writer.
pub struct ConnHandle {
    pub conn_id: Uuid,
    pub tx: mpsc::Sender<ServerToClient>,
}

pub struct Room {
    pub room_id: String,
    pub room_name: String,
    pub lobby_players: Vec<LobbyPlayer>,
    pub connections: HashMap<String, ConnHandle>,
    pub game: Option<GameState>,
}

impl Room {
    pub fn new(index: usize) -> Self {
        Room {
            room_id: format!("room-{}", index),
            room_name: format!("Room {}", index),
            lobby_players: Vec::new(),
            connections: HashMap::new(),
            game: None,
        }
    }

    pub fn status(&self) -> RoomStatus {
        if self.game.is_some() {
            RoomStatus::InGame
        } else if self.lobby_players.is_empty() {
            RoomStatus::Empty
        } else {
            RoomStatus::Gathering
        }
    }

    pub fn player_count(&self) -> usize {
        match &self.game {
            Some(game) => game.players.len(),
            None => self.lobby_players.len(),
        }
    }

    /// Status and head count together; the lobby view republishes whenever
    /// this pair changes.
    pub fn occupancy(&self) -> (RoomStatus, usize) {
        (self.status(), self.player_count())
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            room_id: self.room_id.clone(),
            room_name: self.room_name.clone(),
            status: self.status(),
            player_count: self.player_count(),
            max_players: MAX_PLAYERS,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    rooms: Arc<Vec<Arc<Mutex<Room>>>>,
    lobby: Arc<Mutex<HashMap<Uuid, mpsc::Sender<ServerToClient>>>>,
}

impl AppState {
    /// Pre-create the ten rooms. They are never destroyed.
    pub fn new() -> Self {
        let rooms = (1..=NUM_ROOMS)
            .map(|i| Arc::new(Mutex::new(Room::new(i))))
            .collect();
        AppState {
            rooms: Arc::new(rooms),
            lobby: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn room(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms
            .iter()
            .find(|r| r.lock().room_id == room_id)
            .cloned()
    }

    pub fn room_summaries(&self) -> Vec<RoomSummary> {
        self.rooms.iter().map(|r| r.lock().summary()).collect()
    }

    pub fn subscribe_lobby(&self, sub_id: Uuid, tx: mpsc::Sender<ServerToClient>) {
        self.lobby.lock().insert(sub_id, tx);
    }

    pub fn unsubscribe_lobby(&self, sub_id: &Uuid) {
        self.lobby.lock().remove(sub_id);
    }

    /// Push a fresh `rooms_update` to every lobby subscriber. Callers must
    /// not hold any room lock: summaries take each room lock in turn.
    pub fn publish_rooms(&self) {
        let msg = ServerToClient::RoomsUpdate {
            rooms: self.room_summaries(),
        };
        let mut subs = self.lobby.lock();
        let dead: Vec<Uuid> = subs
            .iter()
            .filter(|(_, tx)| tx.try_send(msg.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            subs.remove(&id);
        }
    }
}

/// Enqueue a frame for one player; a full or closed queue drops the
/// connection.
pub fn send_to(room: &mut Room, player_id: &str, msg: ServerToClient) {
    let failed = match room.connections.get(player_id) {
        Some(conn) => conn.tx.try_send(msg).is_err(),
        None => false,
    };
    if failed {
        warn!(
            "[DROP] room={} player={} outbound queue unavailable",
            room.room_id, player_id
        );
        room.connections.remove(player_id);
    }
}

/// Fan a frame out to every connection in the room, dropping any whose
/// queue is full or closed.
pub fn broadcast(room: &mut Room, msg: &ServerToClient) {
    let failed: Vec<String> = room
        .connections
        .iter()
        .filter(|(_, conn)| conn.tx.try_send(msg.clone()).is_err())
        .map(|(pid, _)| pid.clone())
        .collect();
    for pid in failed {
        warn!("[DROP] room={} player={} outbound queue unavailable", room.room_id, pid);
        room.connections.remove(&pid);
    }
}

/// Send every connection its personalized view of the game.
pub fn broadcast_game_state(room: &mut Room) {
    let Some(game) = &room.game else { return };
    let frames: Vec<(String, ServerToClient)> = room
        .connections
        .keys()
        .map(|pid| {
            (
                pid.clone(),
                ServerToClient::GameState {
                    game: game.snapshot_for(pid),
                },
            )
        })
        .collect();
    for (pid, frame) in frames {
        send_to(room, &pid, frame);
    }
}

pub fn broadcast_lobby_update(room: &mut Room) {
    let msg = ServerToClient::LobbyUpdate {
        room_id: room.room_id.clone(),
        players: room.lobby_players.clone(),
        status: room.status(),
    };
    broadcast(room, &msg);
}

/// Register a display name in the room's waiting list. Re-joining under
/// the same player id just updates the name.
pub fn join_lobby(room: &mut Room, player_id: &str, player_name: &str) -> Result<(), GameError> {
    if room.game.is_some() {
        return Err(GameError::RoomBusy);
    }
    let trimmed = player_name.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LEN {
        return Err(GameError::MalformedCommand(
            "player_name must be 1-20 characters".into(),
        ));
    }
    if let Some(existing) = room.lobby_players.iter_mut().find(|p| p.id == player_id) {
        existing.name = trimmed.to_string();
        return Ok(());
    }
    if room.lobby_players.len() >= MAX_PLAYERS {
        return Err(GameError::RoomFull);
    }
    if room
        .lobby_players
        .iter()
        .any(|p| p.name.to_lowercase() == trimmed.to_lowercase())
    {
        return Err(GameError::DuplicateName);
    }
    room.lobby_players.push(LobbyPlayer {
        id: player_id.to_string(),
        name: trimmed.to_string(),
    });
    info!("[JOIN] room={} player={} name={}", room.room_id, player_id, trimmed);
    Ok(())
}

pub fn leave_lobby(room: &mut Room, player_id: &str) -> Result<(), GameError> {
    let before = room.lobby_players.len();
    room.lobby_players.retain(|p| p.id != player_id);
    if room.lobby_players.len() == before {
        return Err(GameError::NotInLobby);
    }
    info!("[LEAVE] room={} player={}", room.room_id, player_id);
    Ok(())
}

/// Seat the current roster and deal round 1.
pub fn start_game(room: &mut Room, player_id: &str) -> Result<(), GameError> {
    if room.game.is_some() {
        return Err(GameError::RoomBusy);
    }
    if !room.lobby_players.iter().any(|p| p.id == player_id) {
        return Err(GameError::NotInLobby);
    }
    if room.lobby_players.len() < MIN_PLAYERS {
        return Err(GameError::WrongPhase("need at least 2 players to start"));
    }
    room.game = Some(GameState::new(&room.lobby_players)?);
    info!(
        "[START] room={} players={}",
        room.room_id,
        room.lobby_players.len()
    );
    Ok(())
}

/// Tear the game down and empty the roster. The `lobby_reset` goes out to
/// a snapshot of the current connections before any state changes, so a
/// concurrent disconnect cannot drop members mid-broadcast.
pub fn end_game(room: &mut Room) -> Result<(), GameError> {
    if room.game.is_none() {
        return Err(GameError::WrongPhase("no game to end"));
    }
    let msg = ServerToClient::LobbyReset {
        room_id: room.room_id.clone(),
    };
    let snapshot: Vec<mpsc::Sender<ServerToClient>> =
        room.connections.values().map(|c| c.tx.clone()).collect();
    for tx in snapshot {
        let _ = tx.try_send(msg.clone());
    }
    room.game = None;
    room.lobby_players.clear();
    info!("[END] room={} reset to empty", room.room_id);
    Ok(())
}
