use axum::extract::ws::Message;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::watch::{ReportEvent, ReportEventKind};

/// Wire envelope pushed to every connected viewer when a report file is
/// added or modified. Viewers filter by suffix and by relevance to their
/// currently displayed handout; the server relays raw.
#[derive(Debug, Serialize)]
pub struct EventEnvelope {
    pub event: &'static str,
    pub data: EventData,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventData {
    pub file_path: String,
}

impl EventEnvelope {
    pub fn from_report_event(event: &ReportEvent) -> Self {
        let kind = match event.kind {
            ReportEventKind::NewReport => "new-report",
            ReportEventKind::ReportChanged => "report-changed",
        };
        Self {
            event: kind,
            data: EventData {
                file_path: path_string(&event.path),
            },
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub struct Viewer {
    pub conn_id: String,
    sender: mpsc::Sender<Message>,
}

impl Viewer {
    pub async fn send_text(&self, text: String) -> bool {
        self.sender.send(Message::Text(text)).await.is_ok()
    }
}

/// Explicit subscriber registry: viewers are added on connect, removed on
/// disconnect or on the first failed send. Nothing here is coupled to the
/// watcher's lifetime; the registry only fans out.
#[derive(Default)]
pub struct ViewerRegistry {
    conn_counter: AtomicU64,
    viewers: RwLock<HashMap<String, Arc<Viewer>>>,
}

impl ViewerRegistry {
    pub async fn register(&self, sender: mpsc::Sender<Message>) -> Arc<Viewer> {
        let id = self.conn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let viewer = Arc::new(Viewer {
            conn_id: format!("viewer-{id}"),
            sender,
        });
        self.viewers
            .write()
            .await
            .insert(viewer.conn_id.clone(), viewer.clone());
        info!(event = "viewer_connected", conn_id = %viewer.conn_id);
        viewer
    }

    pub async fn remove(&self, viewer: &Viewer, reason: &str) {
        self.viewers.write().await.remove(&viewer.conn_id);
        info!(event = "viewer_disconnected", conn_id = %viewer.conn_id, reason = reason);
    }

    pub async fn len(&self) -> usize {
        self.viewers.read().await.len()
    }

    pub async fn broadcast(&self, envelope: &EventEnvelope) {
        let text = match serde_json::to_string(envelope) {
            Ok(text) => text,
            Err(err) => {
                warn!(event = "envelope_encode_error", error = %err);
                return;
            }
        };
        let viewers: Vec<Arc<Viewer>> =
            self.viewers.read().await.values().cloned().collect();
        for viewer in viewers {
            if !viewer.send_text(text.clone()).await {
                warn!(event = "send_error", conn_id = %viewer.conn_id);
                self.remove(&viewer, "send_error").await;
            }
        }
    }
}
