mod routes;
mod viewers;
mod watch;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use notify::RecommendedWatcher;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::viewers::{EventEnvelope, ViewerRegistry};
use crate::watch::ReportEvent;

#[derive(Parser, Debug)]
#[command(name = "gb-server")]
struct Args {
    /// Listen address; falls back to GB_ADDR, then 127.0.0.1:3000
    #[arg(long, default_value = "")]
    addr: String,
    /// Root of the grading artifact tree; falls back to GB_ROOT, then cwd
    #[arg(long, default_value = "")]
    root: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

pub struct AppState {
    pub root: RwLock<PathBuf>,
    pub registry: ViewerRegistry,
    pub watcher: Mutex<RecommendedWatcher>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let addr: SocketAddr = resolve_addr(&args.addr)
        .parse()
        .context("invalid listen address")?;
    let root = gb_index::validate_root(&resolve_root(&args.root))
        .context("invalid artifact root")?;

    let (event_tx, mut event_rx) = mpsc::channel::<ReportEvent>(256);
    let watcher = watch::start_watcher(&root, event_tx)
        .with_context(|| format!("failed to watch {}", root.display()))?;

    let state = Arc::new(AppState {
        root: RwLock::new(root.clone()),
        registry: ViewerRegistry::default(),
        watcher: Mutex::new(watcher),
    });

    let notifier_state = state.clone();
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            info!(event = "report_event", kind = ?event.kind, path = %event.path.display());
            let envelope = EventEnvelope::from_report_event(&event);
            notifier_state.registry.broadcast(&envelope).await;
        }
    });

    let app = Router::new()
        .route("/api/assignments", get(routes::list_assignments))
        .route(
            "/api/handout-report/:handout/:timestamp/:check_id",
            get(routes::handout_report),
        )
        .route("/api/set-path", post(routes::set_path))
        .route("/ws", get(routes::ws_upgrade))
        .route("/health", get(routes::health))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(event = "server_start", addr = %addr, root = %root.display());

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!(event = "server_shutdown");
    };

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(event = "server_error", error = %err);
    }
    Ok(())
}

fn init_logging(debug: bool) {
    let level = if debug {
        "debug".to_string()
    } else if let Ok(level) = std::env::var("GB_LOG_LEVEL") {
        level
    } else {
        "info".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn resolve_addr(addr_flag: &str) -> String {
    if !addr_flag.trim().is_empty() {
        return addr_flag.to_string();
    }
    if let Ok(value) = std::env::var("GB_ADDR") {
        if !value.trim().is_empty() {
            return value;
        }
    }
    "127.0.0.1:3000".to_string()
}

fn resolve_root(root_flag: &str) -> PathBuf {
    if !root_flag.trim().is_empty() {
        return PathBuf::from(root_flag);
    }
    if let Ok(value) = std::env::var("GB_ROOT") {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}
