use gb_core::REPORT_SUFFIX;
use notify::event::{Event, EventKind};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEventKind {
    NewReport,
    ReportChanged,
}

/// Raw filesystem delta for one report file. No debouncing, no relevance
/// filtering here; only the reconciler knows which handout is on screen.
#[derive(Debug, Clone)]
pub struct ReportEvent {
    pub kind: ReportEventKind,
    pub path: PathBuf,
}

/// Maps a notify event to the report events it implies: one per path ending
/// in the report suffix. Removals, renames and metadata churn are dropped.
pub fn report_events(event: &Event) -> Vec<ReportEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => ReportEventKind::NewReport,
        EventKind::Modify(_) => ReportEventKind::ReportChanged,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter(|path| path.to_string_lossy().ends_with(REPORT_SUFFIX))
        .map(|path| ReportEvent {
            kind,
            path: path.clone(),
        })
        .collect()
}

/// Starts a recursive watcher on `root`, relaying report events into `tx`.
/// The returned watcher owns the subscription; re-pointing it on a root
/// switch goes through [`repoint`].
pub fn start_watcher(
    root: &Path,
    tx: mpsc::Sender<ReportEvent>,
) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        match result {
            Ok(event) => {
                for report_event in report_events(&event) {
                    if tx.blocking_send(report_event).is_err() {
                        return;
                    }
                }
            }
            Err(err) => warn!(event = "watch_error", error = %err),
        }
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

/// Moves the watcher to a new root. The new subscription is established
/// before the old one is dropped, so no window exists in which nothing is
/// watched; a failure leaves the old subscription in place.
pub fn repoint(
    watcher: &mut RecommendedWatcher,
    old_root: &Path,
    new_root: &Path,
) -> notify::Result<()> {
    watcher.watch(new_root, RecursiveMode::Recursive)?;
    if let Err(err) = watcher.unwatch(old_root) {
        warn!(event = "unwatch_error", path = %old_root.display(), error = %err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    fn event(kind: EventKind, paths: Vec<&str>) -> Event {
        let mut event = Event::new(kind);
        event.paths = paths.into_iter().map(PathBuf::from).collect();
        event
    }

    #[test]
    fn create_maps_to_new_report() {
        let events = report_events(&event(
            EventKind::Create(CreateKind::File),
            vec!["/root/A/H1/grading/2024-01-01-00-00-00/check00-report.html"],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ReportEventKind::NewReport);
    }

    #[test]
    fn modify_maps_to_report_changed() {
        let events = report_events(&event(
            EventKind::Modify(ModifyKind::Any),
            vec!["/root/A/H1/grading/2024-01-01-00-00-00/check00-report.html"],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ReportEventKind::ReportChanged);
    }

    #[test]
    fn non_report_paths_and_removals_are_dropped() {
        assert!(report_events(&event(
            EventKind::Create(CreateKind::File),
            vec!["/root/A/H1/grading/2024-01-01-00-00-00/out.txt"],
        ))
        .is_empty());
        assert!(report_events(&event(
            EventKind::Remove(RemoveKind::File),
            vec!["/root/A/H1/grading/2024-01-01-00-00-00/check00-report.html"],
        ))
        .is_empty());
    }
}
