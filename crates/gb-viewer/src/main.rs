mod session;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

use crate::session::{Session, SyncAction, DEBOUNCE_WINDOW};

/// Fixed reconnect delay; the viewer retries forever, which suits a
/// long-lived grading session watching a tree that outlives any one server
/// restart.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "gb-viewer")]
struct Args {
    /// host:port of the gb-server instance
    #[arg(long, default_value = "127.0.0.1:3000")]
    server: String,
    /// Root of the grading artifact tree; falls back to GB_ROOT, then cwd
    #[arg(long, default_value = "")]
    root: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    event: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventData {
    file_path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let root = gb_index::validate_root(&resolve_root(&args.root))
        .context("invalid artifact root")?;
    let url = Url::parse(&format!("ws://{}/ws", args.server))
        .context("invalid server address")?;

    let mut session = Session::new();
    session.refresh_snapshot(gb_index::scan(&root));
    print_status(&session);

    loop {
        let (ws, _) = match connect_async(url.clone()).await {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "connect_error", error = %err);
                tokio::time::sleep(RECONNECT_DELAY).await;
                continue;
            }
        };
        info!(event = "connected", server = %args.server);

        // Catch up on anything that changed while disconnected.
        session.refresh_snapshot(gb_index::scan(&root));
        print_status(&session);

        run_connection(ws, &mut session, &root).await;

        warn!(event = "disconnected", server = %args.server);
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_connection(
    mut ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    session: &mut Session,
    root: &PathBuf,
) {
    // Single-shot debounce deadline; restarted, never stacked.
    let mut deadline: Option<Instant> = None;

    loop {
        let debounce = async move {
            match deadline {
                Some(at) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = debounce => {
                deadline = None;
                let snapshot = gb_index::scan(root);
                match session.begin_apply() {
                    Some(anchor) => session.apply_snapshot(snapshot, anchor),
                    None => session.refresh_snapshot(snapshot),
                }
                print_status(session);
            }
            message = ws.next() => {
                let message = match message {
                    Some(Ok(value)) => value,
                    Some(Err(err)) => {
                        warn!(event = "read_error", error = %err);
                        return;
                    }
                    None => return,
                };
                let Message::Text(text) = message else {
                    continue;
                };
                let envelope: EventEnvelope = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(err) => {
                        warn!(event = "envelope_invalid", error = %err);
                        continue;
                    }
                };
                if envelope.event != "new-report" && envelope.event != "report-changed" {
                    continue;
                }
                match session.on_report_event(&envelope.data.file_path) {
                    SyncAction::Ignore => {}
                    SyncAction::RefreshBackground => {
                        session.refresh_snapshot(gb_index::scan(root));
                        print_status(session);
                    }
                    SyncAction::StartDebounce => {
                        info!(event = "waiting_for_files");
                        deadline = Some(Instant::now() + DEBOUNCE_WINDOW);
                    }
                    SyncAction::RestartDebounce => {
                        deadline = Some(Instant::now() + DEBOUNCE_WINDOW);
                    }
                }
            }
        }
    }
}

fn print_status(session: &Session) {
    let Some(handout) = session.current_handout() else {
        println!("no grade reports found");
        return;
    };
    let Some(run) = session.current_grade_check() else {
        return;
    };
    let summary: Vec<String> = run
        .checks
        .iter()
        .map(|check| format!("{} [{}]", check.display_name, check.status))
        .collect();
    let viewing = session
        .current_check()
        .map(|check| check.display_name.clone())
        .unwrap_or_default();
    println!(
        "{} @ {} | viewing: {} | {}",
        handout.name,
        run.timestamp,
        viewing,
        summary.join(", ")
    );
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
