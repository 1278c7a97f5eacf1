use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rand::{seq::SliceRandom, Rng};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use uuid::Uuid;
use wordwolf_protocol::*;

mod game;
mod topics;

use game::{Player, Room, Tx};
use topics::{BuiltinTopics, TopicProvider};

// ==== knobs ====
const MAX_PLAYERS: usize = 10; // room capacity cap
const MIN_PLAYERS: usize = 4; // minimum to start a round
const DEFAULT_SECONDS_PER_PLAYER: u64 = 90; // discussion budget per player
const GRACE_SECS: u64 = 60; // seat held after a mid-game disconnect
const FOX_REVEAL_DELAY_SECS: u64 = 2; // pause between fox reveal and wolf vote

#[derive(Clone)]
struct AppState {
    rooms: Arc<Mutex<Rooms>>,
    sessions: Arc<Mutex<Sessions>>,
    topics: Arc<dyn TopicProvider>,
}

type Rooms = HashMap<String, game::Room>;
type Sessions = HashMap<String, SessionEntry>;

/// Last-known whereabouts of a session token, for reconnection.
struct SessionEntry {
    room_id: String,
    player_name: String,
    player_id: Uuid,
}

impl AppState {
    fn new(topics: Arc<dyn TopicProvider>) -> Self {
        AppState {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            topics,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let state = AppState::new(Arc::new(BuiltinTopics));
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state.clone());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("word wolf server listening on ws://{addr}/ws");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx_out, mut rx_out) = mpsc::unbounded_channel::<ServerToClient>();

    tokio::spawn(async move {
        while let Some(msg) = rx_out.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let my_id = Uuid::new_v4();
    let _ = tx_out.send(ServerToClient::Hello { your_id: my_id });
    tracing::debug!(conn = %my_id, "connected");

    let mut joined_room: Option<String> = None;
    let mut my_session: Option<String> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(t) => {
                if let Ok(cmd) = serde_json::from_str::<ClientToServer>(&t) {
                    route_cmd(cmd, &state, &mut joined_room, &mut my_session, my_id, &tx_out).await;
                } else {
                    let _ = tx_out.send(ServerToClient::Error {
                        message: "bad json".into(),
                    });
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let (Some(room), Some(session)) = (&joined_room, &my_session) {
        handle_disconnect(&state, room, my_id, session);
    }
    tracing::debug!(conn = %my_id, "disconnected");
}

async fn route_cmd(
    cmd: ClientToServer,
    state: &AppState,
    joined_room: &mut Option<String>,
    my_session: &mut Option<String>,
    my_id: Uuid,
    tx_out: &Tx,
) {
    match cmd {
        ClientToServer::CreateRoom {
            player_name,
            wolf_count,
            session_id,
        } => {
            create_room(
                state,
                my_id,
                tx_out,
                joined_room,
                my_session,
                player_name,
                wolf_count,
                session_id,
            );
        }
        ClientToServer::JoinRoom {
            room_id,
            player_name,
            session_id,
        } => {
            join_room(
                state,
                my_id,
                tx_out,
                joined_room,
                my_session,
                room_id,
                player_name,
                session_id,
            );
        }
        ClientToServer::RejoinRoom {
            room_id,
            session_id,
            player_name,
        } => {
            rejoin_room(
                state,
                my_id,
                tx_out,
                joined_room,
                my_session,
                room_id,
                session_id,
                player_name,
            );
        }
        ClientToServer::StartGame { seconds_per_player } => {
            if let Some(room) = joined_room {
                start_game(state, room, my_id, tx_out, seconds_per_player).await;
            }
        }
        ClientToServer::RerollTopics => {
            if let Some(room) = joined_room {
                reroll_topics(state, room, tx_out).await;
            }
        }
        ClientToServer::Reaction { kind } => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    let player_name = r
                        .players
                        .iter()
                        .find(|p| p.id == my_id)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| "unknown".into());
                    game::broadcast(r, ServerToClient::ShowReaction { kind, player_name });
                });
            }
        }
        ClientToServer::RequestQuestions => {
            if let Some(room) = joined_room {
                request_questions(state, room, my_id, tx_out).await;
            }
        }
        ClientToServer::SelectQuestioner => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    select_participant(r, my_id, CheckKind::Asked);
                });
            }
        }
        ClientToServer::SelectAnswerer => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    select_participant(r, my_id, CheckKind::Answered);
                });
            }
        }
        ClientToServer::SubmitAllAnswer { answer } => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    let Some(p) = r.players.iter().find(|p| p.id == my_id) else {
                        return;
                    };
                    let player_name = p.name.clone();
                    game::broadcast(
                        r,
                        ServerToClient::AllAnswerSubmitted {
                            player_id: my_id,
                            player_name,
                            answer,
                        },
                    );
                });
            }
        }
        ClientToServer::UpdateCheck {
            player_id,
            kind,
            checked,
        } => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    let Some(p) = r.players.iter_mut().find(|p| p.id == player_id) else {
                        return;
                    };
                    match kind {
                        CheckKind::Asked => p.has_asked = checked,
                        CheckKind::Answered => p.has_answered = checked,
                    }
                    game::broadcast(
                        r,
                        ServerToClient::CheckUpdated {
                            player_id,
                            kind,
                            checked,
                        },
                    );
                });
            }
        }
        ClientToServer::GoToVoting => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    if r.phase != Phase::Playing {
                        game::send_err_to(r, my_id, "Not in the discussion phase.");
                        return;
                    }
                    game::begin_fox_voting(r);
                    game::log_room("VOTING", r);
                });
            }
        }
        ClientToServer::Vote { phase, target_id } => {
            if let Some(room) = joined_room {
                handle_vote(state, room, my_id, phase, target_id);
            }
        }
        ClientToServer::PlayAgain => {
            if let Some(room) = joined_room {
                with_room(state, room, |r| {
                    game::reset_for_new_game(r);
                    game::broadcast(
                        r,
                        ServerToClient::GameReset {
                            players: game::public_players(r),
                        },
                    );
                    game::log_room("RESET", r);
                });
            }
        }
    }
}

fn with_room<F: FnOnce(&mut game::Room)>(state: &AppState, room: &str, f: F) {
    let mut rooms = state.rooms.lock();
    if let Some(r) = rooms.get_mut(room) {
        f(r);
    }
}

/// Random 4-digit id, zero-padded, re-rolled until unused among live
/// rooms. Ids free up for reuse when their room is deleted.
fn generate_room_id(rooms: &Rooms) -> String {
    loop {
        let n: u32 = rand::thread_rng().gen_range(0..10_000);
        let id = format!("{n:04}");
        if !rooms.contains_key(&id) {
            return id;
        }
    }
}

fn create_room(
    state: &AppState,
    my_id: Uuid,
    tx_out: &Tx,
    joined_room: &mut Option<String>,
    my_session: &mut Option<String>,
    player_name: String,
    wolf_count: usize,
    session_id: Option<String>,
) {
    let session = session_id
        .clone()
        .unwrap_or_else(|| my_id.to_string());

    let mut rooms = state.rooms.lock();
    let room_id = generate_room_id(&rooms);
    let mut room = Room::new(room_id.clone(), my_id, wolf_count.max(1));
    room.players.push(Player::new(
        my_id,
        session.clone(),
        player_name.clone(),
        tx_out.clone(),
    ));
    let players = game::public_players(&room);
    rooms.insert(room_id.clone(), room);

    if let Some(token) = session_id {
        state.sessions.lock().insert(
            token,
            SessionEntry {
                room_id: room_id.clone(),
                player_name,
                player_id: my_id,
            },
        );
    }

    *joined_room = Some(room_id.clone());
    *my_session = Some(session.clone());

    tracing::info!(room = %room_id, host = %my_id, "room created");
    let _ = tx_out.send(ServerToClient::RoomCreated {
        room_id,
        players,
        session_id: session,
    });
}

fn join_room(
    state: &AppState,
    my_id: Uuid,
    tx_out: &Tx,
    joined_room: &mut Option<String>,
    my_session: &mut Option<String>,
    room_id: String,
    player_name: String,
    session_id: Option<String>,
) {
    let session = session_id
        .clone()
        .unwrap_or_else(|| my_id.to_string());

    let mut rooms = state.rooms.lock();
    let Some(r) = rooms.get_mut(&room_id) else {
        let _ = tx_out.send(ServerToClient::Error {
            message: "Room not found".into(),
        });
        return;
    };
    if r.players.len() >= MAX_PLAYERS {
        let _ = tx_out.send(ServerToClient::Error {
            message: "Room is full".into(),
        });
        return;
    }
    if r.phase != Phase::Waiting {
        let _ = tx_out.send(ServerToClient::Error {
            message: "Cannot join a game in progress".into(),
        });
        return;
    }

    r.players.push(Player::new(
        my_id,
        session.clone(),
        player_name.clone(),
        tx_out.clone(),
    ));
    game::log_room("JOIN", r);
    game::broadcast(
        r,
        ServerToClient::PlayerJoined {
            players: game::public_players(r),
        },
    );

    if let Some(token) = session_id {
        state.sessions.lock().insert(
            token,
            SessionEntry {
                room_id: room_id.clone(),
                player_name,
                player_id: my_id,
            },
        );
    }

    *joined_room = Some(room_id);
    *my_session = Some(session);
}

/// Reconnection resolution: session token first, then name among
/// disconnected players, then fresh-join fallback while the room is
/// still waiting. Anything else is a terminal `RejoinFailed`.
fn rejoin_room(
    state: &AppState,
    my_id: Uuid,
    tx_out: &Tx,
    joined_room: &mut Option<String>,
    my_session: &mut Option<String>,
    room_id: String,
    session_id: String,
    player_name: String,
) {
    let mut rooms = state.rooms.lock();
    let Some(r) = rooms.get_mut(&room_id) else {
        let _ = tx_out.send(ServerToClient::RejoinFailed {
            message: "Room not found. It may have already closed.".into(),
        });
        return;
    };

    let seat = r
        .players
        .iter()
        .position(|p| p.session_id == session_id)
        .or_else(|| {
            r.players
                .iter()
                .position(|p| p.name == player_name && !p.is_connected)
        });

    let Some(seat) = seat else {
        // Unknown session: treat as a fresh join while the lobby is open.
        if r.phase != Phase::Waiting {
            let _ = tx_out.send(ServerToClient::RejoinFailed {
                message: "Game in progress, cannot join.".into(),
            });
            return;
        }
        if r.players.len() >= MAX_PLAYERS {
            let _ = tx_out.send(ServerToClient::RejoinFailed {
                message: "Room is full.".into(),
            });
            return;
        }
        r.players.push(Player::new(
            my_id,
            session_id.clone(),
            player_name.clone(),
            tx_out.clone(),
        ));
        let _ = tx_out.send(ServerToClient::RejoinSuccess {
            room_id: room_id.clone(),
            game_state: r.phase,
            role: None,
            word: None,
            timer_seconds: r.timer_seconds,
            players: game::public_players(r),
            topics: None,
            votes: None,
        });
        game::broadcast(
            r,
            ServerToClient::PlayerJoined {
                players: game::public_players(r),
            },
        );
        state.sessions.lock().insert(
            session_id.clone(),
            SessionEntry {
                room_id: room_id.clone(),
                player_name,
                player_id: my_id,
            },
        );
        *joined_room = Some(room_id);
        *my_session = Some(session_id);
        return;
    };

    // Cancel any pending grace-period removal for this seat.
    if let Some(handle) = r.grace.remove(&r.players[seat].session_id) {
        handle.abort();
    }

    let old_id = r.players[seat].id;
    r.players[seat].id = my_id;
    r.players[seat].is_connected = true;
    // A name-matched fallback adopts the newly presented token, so the
    // next disconnect resolves against the token this client holds.
    r.players[seat].session_id = session_id.clone();
    r.players[seat].tx = tx_out.clone();

    r.fox_votes.rebind_voter(old_id, my_id);
    r.wolf_votes.rebind_voter(old_id, my_id);
    if r.host == old_id {
        r.host = my_id;
    }

    let (topics, votes) = if r.phase == Phase::Result {
        (r.topics.clone(), Some(game::vote_snapshot(r)))
    } else {
        (None, None)
    };

    let me = &r.players[seat];
    let name = me.name.clone();
    let _ = tx_out.send(ServerToClient::RejoinSuccess {
        room_id: room_id.clone(),
        game_state: r.phase,
        role: me.role,
        word: me.word.clone(),
        timer_seconds: r.timer_seconds,
        players: game::public_players(r),
        topics,
        votes,
    });
    game::broadcast_except(
        r,
        my_id,
        ServerToClient::PlayerReconnected {
            player_id: my_id,
            player_name: name.clone(),
            players: game::public_players(r),
        },
    );
    tracing::info!(room = %room_id, player = %name, "reconnected");

    state.sessions.lock().insert(
        session_id.clone(),
        SessionEntry {
            room_id: room_id.clone(),
            player_name,
            player_id: my_id,
        },
    );
    *joined_room = Some(room_id);
    *my_session = Some(session_id);
}

/// Starts a round: topics come from the provider while no room lock is
/// held, then the room is re-validated before any state changes.
async fn start_game(
    state: &AppState,
    room_id: &str,
    my_id: Uuid,
    tx_out: &Tx,
    seconds_per_player: Option<u64>,
) {
    {
        let rooms = state.rooms.lock();
        let Some(r) = rooms.get(room_id) else {
            return;
        };
        if r.phase != Phase::Waiting {
            game::send_err_to(r, my_id, "Game already started.");
            return;
        }
        if r.players.len() < MIN_PLAYERS {
            game::send_err_to(r, my_id, "Need at least 4 players.");
            return;
        }
    }

    let topics = match state.topics.generate_topics().await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(room = room_id, error = %e, "topic generation failed");
            let _ = tx_out.send(ServerToClient::Error {
                message: format!("Could not generate topics: {e}"),
            });
            return;
        }
    };

    let gen = {
        let mut rooms = state.rooms.lock();
        let Some(r) = rooms.get_mut(room_id) else {
            return;
        };
        if r.phase != Phase::Waiting || r.players.len() < MIN_PLAYERS {
            game::send_err_to(r, my_id, "Room changed while generating topics.");
            return;
        }

        r.topics = Some(topics);
        game::assign_roles(r);
        r.phase = Phase::Playing;
        let spp = seconds_per_player
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_SECONDS_PER_PLAYER);
        r.timer_seconds = r.players.len() as u64 * spp;

        let roster = game::public_players(r);
        for p in r.players.iter() {
            if let (Some(role), Some(word)) = (p.role, p.word.clone()) {
                let _ = p.tx.send(ServerToClient::GameStarted {
                    role,
                    word,
                    timer_seconds: r.timer_seconds,
                    players: roster.clone(),
                });
            }
        }

        r.timer_gen += 1;
        game::log_room("START", r);
        r.timer_gen
    };

    start_timer(state.clone(), room_id.to_string(), gen);
}

/// New topics and a fresh shuffle without touching phase or timer.
async fn reroll_topics(state: &AppState, room_id: &str, tx_out: &Tx) {
    {
        let rooms = state.rooms.lock();
        let Some(r) = rooms.get(room_id) else {
            return;
        };
        if r.phase != Phase::Playing {
            return;
        }
    }

    let topics = match state.topics.generate_topics().await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(room = room_id, error = %e, "topic reroll failed");
            let _ = tx_out.send(ServerToClient::Error {
                message: format!("Could not generate topics: {e}"),
            });
            return;
        }
    };

    let mut rooms = state.rooms.lock();
    let Some(r) = rooms.get_mut(room_id) else {
        return;
    };
    if r.phase != Phase::Playing {
        return;
    }
    r.topics = Some(topics);
    game::assign_roles(r);
    for p in r.players.iter() {
        if let (Some(role), Some(word)) = (p.role, p.word.clone()) {
            let _ = p.tx.send(ServerToClient::TopicsRerolled { role, word });
        }
    }
    game::log_room("REROLL", r);
}

async fn request_questions(state: &AppState, room_id: &str, my_id: Uuid, tx_out: &Tx) {
    let word = {
        let rooms = state.rooms.lock();
        let Some(r) = rooms.get(room_id) else {
            return;
        };
        let Some(p) = r.players.iter().find(|p| p.id == my_id) else {
            return;
        };
        match p.word.clone() {
            Some(w) => w,
            None => {
                game::send_err_to(r, my_id, "You have no word yet.");
                return;
            }
        }
    };

    match state.topics.generate_questions(&word).await {
        Ok(questions) => {
            let _ = tx_out.send(ServerToClient::QuestionsGenerated { questions });
        }
        Err(e) => {
            tracing::warn!(room = room_id, error = %e, "question generation failed");
            let _ = tx_out.send(ServerToClient::Error {
                message: format!("Could not generate questions: {e}"),
            });
        }
    }
}

/// Picks a random player whose asked/answered flag is still clear and
/// announces them; 20% of picks come with all-answer mode.
fn select_participant(r: &mut game::Room, my_id: Uuid, kind: CheckKind) {
    let candidates: Vec<PlayerRef> = r
        .players
        .iter()
        .filter(|p| match kind {
            CheckKind::Asked => !p.has_asked,
            CheckKind::Answered => !p.has_answered,
        })
        .map(|p| PlayerRef {
            id: p.id,
            name: p.name.clone(),
        })
        .collect();

    let mut rng = rand::thread_rng();
    let Some(pick) = candidates.choose(&mut rng) else {
        game::send_err_to(
            r,
            my_id,
            match kind {
                CheckKind::Asked => "No questioner left to pick.",
                CheckKind::Answered => "No answerer left to pick.",
            },
        );
        return;
    };
    let all_answer_mode = rng.gen_bool(0.2);

    let msg = match kind {
        CheckKind::Asked => ServerToClient::QuestionerSelected {
            questioner: pick.clone(),
            all_answer_mode,
        },
        CheckKind::Answered => ServerToClient::AnswererSelected {
            answerer: pick.clone(),
            all_answer_mode,
        },
    };
    game::broadcast(r, msg);
}

/// Records a ballot and, once every connected eligible voter has cast
/// one, resolves the sub-phase.
fn handle_vote(state: &AppState, room_id: &str, my_id: Uuid, phase: VotePhase, target_id: Uuid) {
    let mut rooms = state.rooms.lock();
    let Some(r) = rooms.get_mut(room_id) else {
        return;
    };

    match phase {
        VotePhase::Fox => {
            if r.phase != Phase::VotingFox {
                game::send_err_to(r, my_id, "Fox vote is not open.");
                return;
            }
            r.fox_votes.record(my_id, target_id);
            if !game::fox_vote_complete(r) {
                return;
            }
            let Some(tallied) = r.fox_votes.tally() else {
                return;
            };
            let Some(fox) = r
                .players
                .iter()
                .find(|p| p.role == Some(Role::Fox))
                .map(|p| PlayerRef {
                    id: p.id,
                    name: p.name.clone(),
                })
            else {
                return;
            };

            if tallied == fox.id {
                // Fox caught: reveal, then open the wolf vote shortly after.
                r.phase = Phase::VotingWolf;
                game::broadcast(
                    r,
                    ServerToClient::FoxVoteResult {
                        fox_caught: true,
                        fox_id: fox.id,
                        fox_name: fox.name,
                    },
                );
                let state = state.clone();
                let room_id = room_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(FOX_REVEAL_DELAY_SECS)).await;
                    let rooms = state.rooms.lock();
                    let Some(r) = rooms.get(&room_id) else {
                        return;
                    };
                    if r.phase != Phase::VotingWolf {
                        return;
                    }
                    game::broadcast(
                        r,
                        ServerToClient::VotingStarted {
                            phase: VotePhase::Wolf,
                            players: game::non_fox_targets(r),
                        },
                    );
                });
            } else {
                // The fox dodged the vote and wins outright.
                game::finish_game(r, Winner::Fox);
            }
        }
        VotePhase::Wolf => {
            if r.phase != Phase::VotingWolf {
                game::send_err_to(r, my_id, "Wolf vote is not open.");
                return;
            }
            r.wolf_votes.record(my_id, target_id);
            if !game::wolf_vote_complete(r) {
                return;
            }
            let Some(tallied) = r.wolf_votes.tally() else {
                return;
            };
            let caught = r
                .players
                .iter()
                .any(|p| p.id == tallied && p.role == Some(Role::Wolf));
            game::finish_game(r, if caught { Winner::Village } else { Winner::Wolf });
        }
    }
}

/// One self-driving countdown per started round. Each tick re-locks the
/// room and checks the generation stamp, so a restarted or cancelled
/// timer dies on its next tick and ticks never race user transitions.
fn start_timer(state: AppState, room_id: String, gen: u64) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.tick().await; // first tick completes immediately
        loop {
            tick.tick().await;
            let mut rooms = state.rooms.lock();
            let Some(r) = rooms.get_mut(&room_id) else {
                return;
            };
            if r.timer_gen != gen || r.phase != Phase::Playing {
                return;
            }
            r.timer_seconds = r.timer_seconds.saturating_sub(1);
            game::broadcast(
                r,
                ServerToClient::TimerUpdate {
                    seconds: r.timer_seconds,
                },
            );
            if r.timer_seconds == 0 {
                game::begin_fox_voting(r);
                game::log_room("TIMEOUT", r);
                return;
            }
        }
    });
}

/// Waiting rooms drop the player on the spot; mid-game the seat is held
/// for `GRACE_SECS` pending a reconnect.
fn handle_disconnect(state: &AppState, room_id: &str, my_id: Uuid, session_id: &str) {
    let mut rooms = state.rooms.lock();
    let Some(r) = rooms.get_mut(room_id) else {
        return;
    };

    if r.phase == Phase::Waiting {
        let Some(seat) = game::seat_of(r, my_id) else {
            return;
        };
        r.players.remove(seat);
        if r.players.is_empty() {
            rooms.remove(room_id);
            state
                .sessions
                .lock()
                .retain(|_, e| e.room_id != room_id);
            tracing::info!(room = room_id, "room deleted");
            return;
        }
        if r.host == my_id {
            r.host = r.players[0].id;
        }
        game::broadcast(
            r,
            ServerToClient::PlayerLeft {
                players: game::public_players(r),
                new_host: r.host,
            },
        );
        return;
    }

    let Some(p) = r.players.iter_mut().find(|p| p.id == my_id) else {
        return;
    };
    p.is_connected = false;
    let player_name = p.name.clone();
    game::broadcast(
        r,
        ServerToClient::PlayerDisconnected {
            player_id: my_id,
            player_name,
            players: game::public_players(r),
        },
    );

    let handle = spawn_grace_removal(state.clone(), room_id.to_string(), session_id.to_string());
    if let Some(stale) = r.grace.insert(session_id.to_string(), handle) {
        stale.abort();
    }
}

/// Removes a seat whose player never came back. Fire-and-revalidate: the
/// task re-reads live state, so a reconnect that raced the abort still
/// keeps its seat.
fn spawn_grace_removal(state: AppState, room_id: String, session_id: String) -> tokio::task::AbortHandle {
    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(GRACE_SECS)).await;
        let mut rooms = state.rooms.lock();
        let Some(r) = rooms.get_mut(&room_id) else {
            return;
        };
        r.grace.remove(&session_id);
        let Some(seat) = r.players.iter().position(|p| p.session_id == session_id) else {
            return;
        };
        if r.players[seat].is_connected {
            return;
        }
        let name = r.players[seat].name.clone();
        r.players.remove(seat);
        tracing::info!(room = %room_id, player = %name, "grace period expired, seat removed");
        if r.players.is_empty() {
            rooms.remove(&room_id);
            state
                .sessions
                .lock()
                .retain(|_, e| e.room_id != room_id);
            tracing::info!(room = %room_id, "room deleted");
        }
    });
    task.abort_handle()
}
