use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tilt_maze::config::ServerConfig;
use tilt_maze::constants::CLOCK_TICK_MS;
use tilt_maze::engine::utils::now_ms;
use tilt_maze::engine::GameSession;
use tilt_maze::error::LoadError;
use tilt_maze::maze::Task;
use tilt_maze::rng::Rng;
use tilt_maze::server_protocol::{
    error_message, parse_client_message, state_message, ParsedClientMessage,
};
use tilt_maze::session_store::{FileSessionStore, SessionStore};
use tilt_maze::task_repository::{parse_task_values, parse_tasks};
use tilt_maze::types::Phase;
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

#[derive(Clone)]
struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    session: GameSession,
    last_enemy_tick_ms: u64,
}

impl ServerState {
    fn new(session: GameSession) -> Self {
        Self {
            clients: HashMap::new(),
            session,
            last_enemy_tick_ms: now_ms(),
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    let config = ServerConfig::from_env();

    let store = FileSessionStore::new(config.session_path.clone());
    info!(path = %store.path().display(), "session store");
    let tasks = match obtain_tasks(&config.tasks_path, &store).await {
        Ok(tasks) => tasks,
        Err(error) => {
            error!(%error, path = %config.tasks_path.display(), "no task pack available");
            std::process::exit(1);
        }
    };

    let rng = config.seed.map(Rng::new).unwrap_or_else(Rng::from_entropy);
    let session = match GameSession::new(tasks, Box::new(store), rng, config.session) {
        Ok(session) => session,
        Err(error) => {
            error!(%error, "failed to create game session");
            std::process::exit(1);
        }
    };

    let state = Arc::new(Mutex::new(ServerState::new(session)));
    start_enemy_loop(state.clone(), config.session.enemy_tick_ms);
    start_clock_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/tasks", get(tasks_handler))
        .route("/api/session", get(session_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir(config.static_dir.as_deref()) {
        let index_file = static_dir.join("index.html");
        info!(root = %static_dir.display(), "serving static files");
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        warn!("static file root not found, serving the API only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, addr = %bind_addr, "failed to bind server socket");
            std::process::exit(1);
        }
    };

    info!(port = config.port, "listening");
    if let Err(error) = axum::serve(listener, app).await {
        error!(%error, "server runtime failed");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Reads the pack once before serving. When it is unusable the copy kept in
/// the saved session is tried before giving up.
async fn obtain_tasks(path: &Path, store: &FileSessionStore) -> Result<Vec<Task>, LoadError> {
    let loaded = match tokio::fs::read_to_string(path).await {
        Ok(text) => parse_tasks(&text),
        Err(source) => Err(LoadError::Unavailable {
            path: path.display().to_string(),
            source,
        }),
    };
    match loaded {
        Ok(catalog) => {
            info!(
                path = %path.display(),
                tasks = catalog.tasks.len(),
                rejected = catalog.rejected.len(),
                "task pack loaded"
            );
            Ok(catalog.tasks)
        }
        Err(error) => {
            warn!(%error, "task pack unusable, trying the saved snapshot");
            match tasks_from_snapshot(store) {
                Some(tasks) => {
                    info!(tasks = tasks.len(), "using task snapshot from saved session");
                    Ok(tasks)
                }
                None => Err(error),
            }
        }
    }
}

fn tasks_from_snapshot(store: &dyn SessionStore) -> Option<Vec<Task>> {
    let saved = store.load().ok().flatten()?;
    let catalog = parse_task_values(saved.tasks?);
    if catalog.tasks.is_empty() {
        return None;
    }
    Some(catalog.tasks)
}

fn resolve_static_dir(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.join("index.html").is_file() {
            return Some(path.to_path_buf());
        }
    }

    let candidates = [PathBuf::from("static"), PathBuf::from("dist/client")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn tasks_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(task_listing(guard.session.tasks()))
}

async fn session_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let mut guard = state.lock().await;
    Json(guard.session.build_snapshot(now_ms(), false))
}

fn task_listing(tasks: &[Task]) -> Value {
    let items: Vec<Value> = tasks
        .iter()
        .map(|task| {
            json!({
                "id": task.id,
                "difficulty": task.difficulty,
                "help": task.help,
            })
        })
        .collect();
    json!({ "tasks": items })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard
            .clients
            .insert(client_id.clone(), ClientContext { tx: tx.clone() });
        let snapshot = guard.session.build_snapshot(now_ms(), false);
        send_to_client(
            &mut guard,
            &client_id,
            &state_message(&snapshot),
            QueuePolicy::DisconnectOnFull,
        );
        info!(client = %client_id, clients = guard.clients.len(), "client connected");
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    handle_disconnect(state, &client_id).await;
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    let mut guard = state.lock().await;
    let now = now_ms();
    debug!(client = %client_id, ?message, "client message");
    match message {
        ParsedClientMessage::Start => {
            guard.session.start(now);
            guard.last_enemy_tick_ms = now;
        }
        ParsedClientMessage::Key { key } => {
            guard.session.handle_key(&key, now);
        }
        ParsedClientMessage::Move { dir } => {
            guard.session.move_dir(dir, now);
        }
        ParsedClientMessage::Click { target } => {
            guard.session.handle_click(target, now);
        }
        ParsedClientMessage::Tilt { beta, gamma } => {
            guard.session.handle_tilt(beta, gamma, now);
        }
        ParsedClientMessage::Continue => {
            guard.session.advance(now);
            guard.last_enemy_tick_ms = now;
        }
        ParsedClientMessage::Restart => {
            guard.session.restart();
        }
    }
    broadcast_snapshot(&mut guard, now, QueuePolicy::DisconnectOnFull);
}

async fn handle_disconnect(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    if guard.clients.remove(client_id).is_some() {
        info!(client = %client_id, clients = guard.clients.len(), "client disconnected");
    }
}

fn disconnect_client_internal(state: &mut ServerState, client_id: &str) {
    let Some(context) = state.clients.remove(client_id) else {
        return;
    };
    warn!(client = %client_id, "send queue full, disconnecting client");
    let _ = context.tx.try_send(OutboundMessage::Close {
        code: 1008,
        reason: "send queue overflow".to_string(),
    });
}

fn start_enemy_loop(state: SharedState, period_ms: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(period_ms.max(1)));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            let now = now_ms();
            let delta_ms = now.saturating_sub(guard.last_enemy_tick_ms);
            guard.last_enemy_tick_ms = now;
            if guard.session.tick(delta_ms) > 0 {
                broadcast_snapshot(&mut guard, now, QueuePolicy::DropOnFull);
            }
        }
    });
}

fn start_clock_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(CLOCK_TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            if guard.session.state().is_timer_running && guard.session.phase() == Phase::Playing {
                broadcast_snapshot(&mut guard, now_ms(), QueuePolicy::DropOnFull);
            }
        }
    });
}

fn broadcast_snapshot(state: &mut ServerState, now: u64, policy: QueuePolicy) {
    let snapshot = state.session.build_snapshot(now, true);
    broadcast(state, &state_message(&snapshot), policy);
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        disconnect_client_internal(state, client_id);
    }
}

fn broadcast(state: &mut ServerState, message: &Value, policy: QueuePolicy) {
    let payload = message.to_string();
    let mut failed_clients = Vec::new();
    for (client_id, client) in &state.clients {
        if client
            .tx
            .try_send(OutboundMessage::Text(payload.clone()))
            .is_err()
            && policy == QueuePolicy::DisconnectOnFull
        {
            failed_clients.push(client_id.clone());
        }
    }
    for client_id in failed_clients {
        disconnect_client_internal(state, &client_id);
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &error_message(message),
        QueuePolicy::DisconnectOnFull,
    );
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}
