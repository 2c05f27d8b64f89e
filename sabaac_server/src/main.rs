mod fanout;
mod registry;

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{stream::StreamExt, SinkExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use sabaac_core::{ClientId, ClientMessage, GameVariant, Snapshot};

use fanout::{ConnId, ConnectionManager};
use registry::SessionRegistry;

/// Shared server state: the session registry and the connection fan-out,
/// injected into every handler rather than living as globals.
struct AppState {
    registry: SessionRegistry,
    connections: ConnectionManager,
}

type SharedState = Arc<AppState>;

/// Which persistent channel a socket serves. The lobby channel carries
/// usernames and the start trigger; the game channel carries actions.
#[derive(Debug, Clone, Copy)]
enum Channel {
    Lobby,
    Game,
}

const DEFAULT_ADDR: &str = "0.0.0.0:7777";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = SharedState::new(AppState {
        registry: SessionRegistry::new(),
        connections: ConnectionManager::new(),
    });

    let app = Router::new()
        .route("/game", post(create_game))
        .route("/game/{code}/join", post(join_game))
        .route("/games", get(list_games))
        .route("/lobbyws", get(lobby_ws_handler))
        .route("/sabaacws", get(game_ws_handler))
        .with_state(state);

    let addr = std::env::var("SABAAC_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    info!("listening on {addr}");
    axum::serve(tokio::net::TcpListener::bind(&addr).await.unwrap(), app)
        .await
        .unwrap();
}

/// Identity token carried on requests and upgrades. Absent on first
/// contact; the server then assigns one and echoes it back.
#[derive(Deserialize)]
struct IdentityQuery {
    identity: Option<ClientId>,
}

#[derive(Serialize)]
struct SeatResponse {
    code: String,
    identity: ClientId,
    turnorder: u32,
}

/// Create a fresh session seeded with the caller as player 1.
async fn create_game(
    State(state): State<SharedState>,
    Query(query): Query<IdentityQuery>,
) -> impl IntoResponse {
    let identity = query.identity.unwrap_or_else(Uuid::new_v4);
    let handle = state.registry.create(GameVariant::CorellianGambit);
    let (code, turnorder) = {
        let mut session = handle.session.lock();
        let turnorder = session
            .join(identity)
            .expect("a fresh session accepts its first player");
        (session.code.clone(), turnorder)
    };
    info!(%code, %identity, "created game");
    Json(SeatResponse {
        code,
        identity,
        turnorder,
    })
}

/// Join an existing session. Idempotent for players already seated.
async fn join_game(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Query(query): Query<IdentityQuery>,
) -> Response {
    let identity = query.identity.unwrap_or_else(Uuid::new_v4);
    let Some(handle) = state.registry.lookup(&code) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let joined = handle.session.lock().join(identity);
    match joined {
        Ok(turnorder) => {
            info!(%code, %identity, turnorder, "joined game");
            Json(SeatResponse {
                code,
                identity,
                turnorder,
            })
            .into_response()
        }
        Err(err) => {
            warn!(%code, %identity, %err, "join refused");
            StatusCode::CONFLICT.into_response()
        }
    }
}

/// Codes of every session still accepting play.
async fn list_games(State(state): State<SharedState>) -> Json<Vec<String>> {
    let codes = state
        .registry
        .list_active()
        .iter()
        .map(|handle| handle.session.lock().code.clone())
        .collect();
    Json(codes)
}

async fn lobby_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<IdentityQuery>,
) -> impl IntoResponse {
    let identity = query.identity.unwrap_or_else(Uuid::new_v4);
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, Channel::Lobby))
}

async fn game_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
    Query(query): Query<IdentityQuery>,
) -> impl IntoResponse {
    let identity = query.identity.unwrap_or_else(Uuid::new_v4);
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity, Channel::Game))
}

/// Lifecycle of one WebSocket connection: register it, pump inbound
/// messages through the session machinery, and always deregister it when
/// the stream ends, however it ends.
async fn handle_socket(socket: WebSocket, state: SharedState, identity: ClientId, channel: Channel) {
    let (mut sender, mut receiver) = socket.split();

    // Writer task: everything addressed to this socket goes through an
    // MPSC channel so fan-out never touches the socket directly.
    let (tx, mut rx) = mpsc::channel::<String>(32);
    tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    let conn = ConnId::new_v4();
    state.connections.subscribe(identity, conn, tx);
    info!(%identity, %conn, ?channel, "client connected");

    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(channel, client_msg, &state, identity, conn).await;
                }
                Err(err) => {
                    warn!(%identity, %err, "failed to parse client message");
                }
            }
        }
    }

    // Covers abrupt disconnects too: the loop above ends on any stream
    // error or close frame.
    state.connections.unsubscribe(conn);
    info!(%identity, %conn, "client connection closed");
}

/// Route one inbound message: resolve the session, apply the transition
/// under the session lock, then fan the committed state out. Rejected
/// transitions are logged and the unchanged state is what gets sent.
async fn handle_client_message(
    channel: Channel,
    msg: ClientMessage,
    state: &SharedState,
    identity: ClientId,
    conn: ConnId,
) {
    let Some(handle) = state.registry.lookup(&msg.code) else {
        warn!(code = %msg.code, "message for unknown or inactive session");
        return;
    };
    state.connections.join_session_channel(&msg.code, conn);

    match channel {
        Channel::Lobby => {
            let payload = {
                let mut session = handle.session.lock();
                let mut started = false;
                if msg.startgame == Some(true) {
                    match session.start() {
                        Ok(()) => started = true,
                        Err(err) => {
                            warn!(code = %msg.code, %err, "start request refused");
                        }
                    }
                } else if let Some(username) = msg.username {
                    if let Err(err) = session.set_username(&identity, username) {
                        warn!(code = %msg.code, %identity, %err, "username update refused");
                    }
                }
                let mut snapshot = Snapshot::project(&session, None);
                // Only a start that actually took sends clients into the game.
                snapshot.startgame = started;
                serde_json::to_string(&snapshot).unwrap()
            };
            state.connections.broadcast(&msg.code, &payload, &[]).await;
        }
        Channel::Game => {
            let (updates, public) = {
                let mut session = handle.session.lock();
                if session.deal_initial_hands() {
                    info!(code = %msg.code, "dealt opening hands");
                }
                if let Some(action) = msg.action {
                    if let Err(err) = session.apply(identity, action, msg.action_value) {
                        warn!(code = %msg.code, %identity, %err, "action rejected");
                    }
                }
                let updates: Vec<(ClientId, String)> = session
                    .players
                    .iter()
                    .map(|player| {
                        let snapshot = Snapshot::project(&session, Some(player));
                        (player.identity, serde_json::to_string(&snapshot).unwrap())
                    })
                    .collect();
                let public = serde_json::to_string(&Snapshot::project(&session, None)).unwrap();
                (updates, public)
            };
            // Seated players get their private view; everyone else on the
            // session channel (spectating tabs) gets the public one.
            let seated: Vec<ClientId> = updates.iter().map(|(target, _)| *target).collect();
            for (target, payload) in updates {
                state.connections.send_to_identity(&target, &payload).await;
            }
            state.connections.broadcast(&msg.code, &public, &seated).await;
        }
    }
}
