use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bitgrid::constants::{DEFAULT_PORT, DEFAULT_WS_PATH, OUTBOUND_QUEUE_CAPACITY};
use bitgrid::error::StoreError;
use bitgrid::registry::OutboundMessage;
use bitgrid::store::{now_iso, EntityStore, MemoryBitStore};
use bitgrid::sync_engine::SyncEngine;
use bitgrid::types::Bit;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{error, info, warn};
use serde_json::json;
use tokio::sync::{mpsc, Mutex};
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

#[derive(Parser, Debug)]
#[command(author, version, about = "Shared grid sync server")]
struct Cli {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Path of the websocket endpoint.
    #[arg(long, env = "WS_PATH", default_value = DEFAULT_WS_PATH)]
    ws_path: String,
    /// JSON file mirroring bit positions. In-memory only when unset.
    #[arg(long, env = "BITGRID_STORE_PATH")]
    store_path: Option<PathBuf>,
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
}

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<SyncEngine>>,
    store: Arc<dyn EntityStore>,
}

struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let store: Arc<dyn EntityStore> = match cli.store_path.clone() {
        Some(path) => Arc::new(MemoryBitStore::with_snapshot_file(path)),
        None => Arc::new(MemoryBitStore::new()),
    };
    let state = AppState {
        engine: Arc::new(Mutex::new(SyncEngine::new(store.clone()))),
        store,
    };

    let engine = state.engine.clone();
    let app = build_router(state, &cli.ws_path, cli.static_dir.as_ref());

    let bind_addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!(
        "[server] listening on http://{bind_addr}, websocket at ws://{bind_addr}{}",
        cli.ws_path
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(engine))
        .await
}

fn build_router(state: AppState, ws_path: &str, static_dir: Option<&PathBuf>) -> Router {
    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/bit", post(create_bit))
        .route("/api/bit/{id}", get(get_bit).delete(delete_bit))
        .route(ws_path, get(ws_handler))
        .with_state(state);

    let app = match resolve_static_dir(static_dir) {
        Some(static_dir) => {
            let index_file = static_dir.join("index.html");
            info!("[server] static file root: {}", static_dir.display());
            app.fallback_service(
                ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
            )
        }
        None => app,
    };
    app.layer(CorsLayer::permissive())
}

async fn shutdown_signal(engine: Arc<Mutex<SyncEngine>>) {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!("[server] failed to listen for shutdown signal: {error}");
        std::future::pending::<()>().await;
    }
    let closed = engine.lock().await.close_all(1001, "server shutting down");
    info!("[server] shutting down; closed {closed} connections");
}

fn resolve_static_dir(configured: Option<&PathBuf>) -> Option<PathBuf> {
    let path = configured?;
    if path.join("index.html").is_file() {
        Some(path.clone())
    } else {
        warn!(
            "[server] static file root {} has no index.html; not serving static files",
            path.display()
        );
        None
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "store": "connected",
        "timestamp": now_iso(),
    }))
}

async fn create_bit(State(state): State<AppState>) -> Result<Json<Bit>, ApiError> {
    let bit = state.store.create(None, None)?;
    info!("[server] created bit {} at ({}, {})", bit.id, bit.x, bit.y);
    Ok(Json(bit))
}

async fn get_bit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Bit>, ApiError> {
    Ok(Json(state.store.get(&id)?))
}

async fn delete_bit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let bit = state.store.delete(&id)?;
    Ok(Json(json!({ "id": bit.id })))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state.engine, socket))
}

async fn handle_socket(engine: Arc<Mutex<SyncEngine>>, socket: WebSocket) {
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE_CAPACITY);
    // The registry holds the only sender, so dropping the connection there
    // also ends the writer.
    let connection_id = engine.lock().await.registry_mut().register(tx);

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

    engine.lock().await.registry_mut().open(connection_id);

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        let mut guard = engine.lock().await;
        match message {
            Message::Text(raw) => guard.receive(connection_id, raw.as_str()),
            Message::Binary(raw) => match std::str::from_utf8(&raw) {
                Ok(text) => guard.receive(connection_id, text),
                Err(_) => warn!("[ws] connection {connection_id} sent invalid utf8"),
            },
            Message::Close(_) => break,
            _ => {}
        }
        if !guard.registry().contains(connection_id) {
            break;
        }
    }

    engine.lock().await.disconnect(connection_id);
    let _ = writer.await;
}
