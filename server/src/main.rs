use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use three_thirteen_protocol::{ClientToServer, GamePhase, RoomSummary, ServerToClient};

mod error;
mod evaluator;
mod game;
mod rooms;

use error::GameError;
use rooms::{AppState, Room};

#[derive(Parser, Debug)]
#[command(name = "three-thirteen-server")]
#[command(about = "Three Thirteen - WebSocket card game server")]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState::new();
    let app = Router::new()
        .route("/health", get(health))
        .route("/rooms", get(list_rooms))
        .route("/ws/lobby", get(ws_lobby))
        .route("/ws/room/:room_id", get(ws_room))
        .with_state(state);

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    info!("listening on http://{}", addr);
    axum::serve(listener, app).await.unwrap();
}

async fn health() -> &'static str {
    "ok"
}

async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.room_summaries())
}

async fn ws_lobby(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_lobby_socket(socket, state))
}

/// Lobby sockets only ever receive: one `rooms_update` on open, then a
/// fresh one whenever any room changes. Inbound frames are ignored.
async fn handle_lobby_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerToClient>(rooms::OUTBOUND_QUEUE);
    let sub_id = Uuid::new_v4();

    let _ = tx.try_send(ServerToClient::RoomsUpdate {
        rooms: state.room_summaries(),
    });
    state.subscribe_lobby(sub_id, tx);
    info!("[LOBBY] subscriber {} connected", sub_id);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    state.unsubscribe_lobby(&sub_id);
    info!("[LOBBY] subscriber {} disconnected", sub_id);
    drop(writer);
}

#[derive(Deserialize)]
struct RoomQuery {
    player_id: String,
}

async fn ws_room(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    Query(query): Query<RoomQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let Some(room) = state.room(&room_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if query.player_id.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    ws.on_upgrade(move |socket| handle_room_socket(socket, state, room, query.player_id))
        .into_response()
}

async fn handle_room_socket(
    socket: WebSocket,
    state: AppState,
    room: Arc<Mutex<Room>>,
    player_id: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerToClient>(rooms::OUTBOUND_QUEUE);
    let conn_id = Uuid::new_v4();
    let room_id = room.lock().room_id.clone();

    {
        let mut r = room.lock();
        let replaced = r
            .connections
            .insert(player_id.clone(), rooms::ConnHandle { conn_id, tx })
            .is_some();
        if replaced {
            // Dropping the old handle ends its writer; last connect wins.
            info!("[REPLACE] room={} player={}", room_id, player_id);
        }
    }
    info!("[CONNECT] room={} player={}", room_id, player_id);

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else { continue };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let current = room.lock().connections.get(&player_id).map(|c| c.conn_id);
                if current != Some(conn_id) {
                    // This socket was replaced; its frames are dropped.
                    break;
                }
                match serde_json::from_str::<ClientToServer>(&text) {
                    Ok(cmd) => route_cmd(&state, &room, &room_id, &player_id, cmd),
                    Err(e) => {
                        warn!("[PARSE] room={} player={} {}", room_id, player_id, e);
                        let mut r = room.lock();
                        rooms::send_to(
                            &mut r,
                            &player_id,
                            error_frame(GameError::MalformedCommand(e.to_string())),
                        );
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    disconnect(&state, &room, &room_id, &player_id, conn_id);
    drop(writer);
}

/// Reader teardown. A lobby-stage player loses their roster entry; an
/// in-game player keeps their seat and simply stops receiving frames.
fn disconnect(
    state: &AppState,
    room: &Arc<Mutex<Room>>,
    room_id: &str,
    player_id: &str,
    conn_id: Uuid,
) {
    let roster_changed = {
        let mut r = room.lock();
        let current = r.connections.get(player_id).map(|c| c.conn_id);
        if current != Some(conn_id) {
            return; // replaced by a newer socket; nothing to clean up
        }
        r.connections.remove(player_id);
        if r.game.is_none() {
            let before = r.lobby_players.len();
            r.lobby_players.retain(|p| p.id != player_id);
            let changed = r.lobby_players.len() != before;
            if changed {
                rooms::broadcast_lobby_update(&mut r);
            }
            changed
        } else {
            false
        }
    };
    info!("[DISCONNECT] room={} player={}", room_id, player_id);
    if roster_changed {
        state.publish_rooms();
    }
}

/// Dispatch one parsed command: take the room lock, run the operation,
/// enqueue the resulting broadcasts, then republish the lobby view if the
/// room's occupancy changed. Failures go back to the originator alone.
fn route_cmd(
    state: &AppState,
    room: &Arc<Mutex<Room>>,
    room_id: &str,
    player_id: &str,
    cmd: ClientToServer,
) {
    info!("[WS] room={} player={} cmd={:?}", room_id, player_id, cmd);
    if cmd.room_id() != room_id {
        let mut r = room.lock();
        rooms::send_to(
            &mut r,
            player_id,
            error_frame(GameError::MalformedCommand(
                "room_id does not match this connection".into(),
            )),
        );
        return;
    }

    let occupancy_changed = {
        let mut r = room.lock();
        let before = r.occupancy();
        match apply(&mut r, player_id, &cmd) {
            Ok(()) => r.occupancy() != before,
            Err(err) => {
                warn!("[REJECT] room={} player={} {}", room_id, player_id, err);
                rooms::send_to(&mut r, player_id, error_frame(err));
                false
            }
        }
    };
    if occupancy_changed {
        state.publish_rooms();
    }
}

fn apply(r: &mut Room, player_id: &str, cmd: &ClientToServer) -> Result<(), GameError> {
    match cmd {
        ClientToServer::JoinLobby { player_name, .. } => {
            rooms::join_lobby(r, player_id, player_name)?;
            rooms::broadcast_lobby_update(r);
            Ok(())
        }
        ClientToServer::LeaveLobby { .. } => {
            rooms::leave_lobby(r, player_id)?;
            rooms::broadcast_lobby_update(r);
            Ok(())
        }
        ClientToServer::StartGame { .. } => {
            rooms::start_game(r, player_id)?;
            rooms::broadcast_game_state(r);
            Ok(())
        }
        ClientToServer::DrawCard { source, .. } => {
            game_mut(r)?.draw(player_id, *source)?;
            rooms::broadcast_game_state(r);
            Ok(())
        }
        ClientToServer::DiscardCard { card_id, .. } => {
            let game = game_mut(r)?;
            game.discard(player_id, card_id)?;
            let round_over = (game.phase == GamePhase::RoundOver)
                .then(|| (game.round_number, game.round_results.clone()));
            rooms::broadcast_game_state(r);
            if let Some((round_number, results)) = round_over {
                rooms::broadcast(
                    r,
                    &ServerToClient::RoundOver {
                        round_number,
                        results,
                    },
                );
            }
            Ok(())
        }
        ClientToServer::GoOut { card_id, .. } => {
            let game = game_mut(r)?;
            game.go_out(player_id, card_id)?;
            let player_name = game
                .players
                .iter()
                .find(|p| p.id == player_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            let final_turns_remaining = game.final_turns_remaining;
            // went-out notice first, so clients can pair it with the turn change
            rooms::broadcast(
                r,
                &ServerToClient::PlayerWentOut {
                    player_name,
                    final_turns_remaining,
                },
            );
            rooms::broadcast_game_state(r);
            Ok(())
        }
        ClientToServer::NextRound { .. } => {
            let game = game_mut(r)?;
            let advanced = game.confirm_next_round(player_id)?;
            let finished = advanced && game.phase == GamePhase::Finished;
            let leaderboard = finished.then(|| game.leaderboard());
            rooms::broadcast_game_state(r);
            if let Some(leaderboard) = leaderboard {
                rooms::broadcast(r, &ServerToClient::GameFinished { leaderboard });
            }
            Ok(())
        }
        ClientToServer::EndGame { .. } => {
            rooms::end_game(r)?;
            Ok(())
        }
    }
}

fn game_mut(r: &mut Room) -> Result<&mut game::GameState, GameError> {
    r.game
        .as_mut()
        .ok_or(GameError::WrongPhase("no game in progress"))
}

fn error_frame(err: GameError) -> ServerToClient {
    ServerToClient::Error {
        message: err.to_string(),
    }
}
