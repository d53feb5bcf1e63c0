use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use gb_index::{fetch_report, scan, validate_root, IndexError};
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RootOverride {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetPathBody {
    path: String,
}

fn error_body(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn index_error_response(err: IndexError) -> Response {
    match err {
        IndexError::InvalidRoot(_) => error_body(StatusCode::BAD_REQUEST, err.to_string()),
        IndexError::ReportNotFound { .. } => {
            error_body(StatusCode::NOT_FOUND, err.to_string())
        }
        IndexError::Io(_) => {
            error_body(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Resolves the root for one request: a `?path=` override is validated and
/// used for this request only, otherwise the server's current root applies.
async fn resolve_root(
    state: &AppState,
    override_path: Option<&str>,
) -> Result<PathBuf, IndexError> {
    match override_path {
        Some(path) => validate_root(Path::new(path)),
        None => Ok(state.root.read().await.clone()),
    }
}

pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RootOverride>,
) -> Response {
    let root = match resolve_root(&state, query.path.as_deref()).await {
        Ok(root) => root,
        Err(err) => return index_error_response(err),
    };
    Json(scan(&root)).into_response()
}

pub async fn handout_report(
    State(state): State<Arc<AppState>>,
    AxumPath((handout, timestamp, check_id)): AxumPath<(String, String, String)>,
    Query(query): Query<RootOverride>,
) -> Response {
    let root = match resolve_root(&state, query.path.as_deref()).await {
        Ok(root) => root,
        Err(err) => return index_error_response(err),
    };
    match fetch_report(&root, &handout, &timestamp, &check_id) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => index_error_response(err),
    }
}

pub async fn set_path(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetPathBody>,
) -> Response {
    let new_root = match validate_root(Path::new(&body.path)) {
        Ok(root) => root,
        Err(err) => return index_error_response(err),
    };
    // Root and watcher swap under the same locks so no scan or event can
    // observe a half-switched root.
    let mut root = state.root.write().await;
    let mut watcher = state.watcher.lock().await;
    if *root != new_root {
        if let Err(err) = crate::watch::repoint(&mut watcher, &root, &new_root) {
            warn!(event = "repoint_error", error = %err);
            return error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to watch {}: {err}", new_root.display()),
            );
        }
        *root = new_root.clone();
        info!(event = "root_switched", root = %new_root.display());
    }
    Json(json!({ "root": new_root })).into_response()
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// One connected viewer. The server pushes report events and expects
/// nothing back; any inbound frame except close/ping is ignored.
async fn handle_socket(state: Arc<AppState>, socket: WebSocket) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(256);
    let viewer = state.registry.register(tx).await;

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if ws_sender.send(message).await.is_err() {
                return;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(event = "read_error", conn_id = %viewer.conn_id, error = %err);
                break;
            }
        }
    }

    state.registry.remove(&viewer, "disconnect").await;
    drop(viewer);
    let _ = write_task.await;
}
