use gb_core::{extract_timestamp, Assignment, Check, GradeCheck, Handout, REPORT_SUFFIX};
use std::time::Duration;

/// Quiet period after the last relevant filesystem event before a new
/// snapshot is applied. A grading run writes many report files in quick
/// succession; the user should see one consolidated update.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(800);

/// Positional cursor into the current snapshot. Meaningless the instant a
/// new snapshot replaces the model; never carried across snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub assignment: usize,
    pub handout: usize,
    pub grade_check: usize,
    pub check: usize,
}

/// Semantic capture of a selection: the only safe anchor across snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionAnchor {
    pub assignment: String,
    pub handout: String,
    pub check_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    ActivityPending(SelectionAnchor),
    Applying,
}

/// What the driver should do in response to a raw report event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Ignore,
    RefreshBackground,
    StartDebounce,
    RestartDebounce,
}

/// The live-update state machine of one viewer. Pure: the driver owns the
/// transport, the timer and the scanner; this type only decides.
pub struct Session {
    pub assignments: Vec<Assignment>,
    pub selection: Option<Selection>,
    pub sync: SyncState,
}

impl Session {
    pub fn new() -> Self {
        Self {
            assignments: Vec::new(),
            selection: None,
            sync: SyncState::Idle,
        }
    }

    pub fn current_handout(&self) -> Option<&Handout> {
        let selection = self.selection.as_ref()?;
        self.assignments
            .get(selection.assignment)?
            .handouts
            .get(selection.handout)
    }

    pub fn current_grade_check(&self) -> Option<&GradeCheck> {
        let selection = self.selection.as_ref()?;
        self.current_handout()?.grade_checks.get(selection.grade_check)
    }

    pub fn current_check(&self) -> Option<&Check> {
        let selection = self.selection.as_ref()?;
        self.current_grade_check()?.checks.get(selection.check)
    }

    fn capture_anchor(&self) -> Option<SelectionAnchor> {
        let selection = self.selection.as_ref()?;
        let assignment = self.assignments.get(selection.assignment)?;
        let handout = assignment.handouts.get(selection.handout)?;
        Some(SelectionAnchor {
            assignment: assignment.name.clone(),
            handout: handout.name.clone(),
            check_id: self.current_check().map(|check| check.check_id.clone()),
        })
    }

    /// Classifies one raw `(kind, path)` event against the current view.
    /// Only the viewer knows which handout is on screen, which is why the
    /// notifier pushes filtering down to here.
    pub fn on_report_event(&mut self, path: &str) -> SyncAction {
        if !path.ends_with(REPORT_SUFFIX) {
            return SyncAction::Ignore;
        }
        let Some(handout) = self.current_handout() else {
            return SyncAction::RefreshBackground;
        };
        if !path.contains(&handout.name) {
            return SyncAction::RefreshBackground;
        }
        let Some(timestamp) = extract_timestamp(path) else {
            return SyncAction::Ignore;
        };
        if let Some(current) = self.current_grade_check() {
            if current.timestamp == timestamp {
                // In-place edit of an already-visible run, e.g. late stderr.
                return SyncAction::RefreshBackground;
            }
        }
        match &self.sync {
            SyncState::ActivityPending(_) => SyncAction::RestartDebounce,
            SyncState::Idle | SyncState::Applying => {
                let anchor = self.capture_anchor();
                match anchor {
                    Some(anchor) => {
                        self.sync = SyncState::ActivityPending(anchor);
                        SyncAction::StartDebounce
                    }
                    None => SyncAction::RefreshBackground,
                }
            }
        }
    }

    /// Debounce window elapsed: hand the captured anchor to the driver and
    /// enter `Applying` until the new snapshot lands.
    pub fn begin_apply(&mut self) -> Option<SelectionAnchor> {
        match std::mem::replace(&mut self.sync, SyncState::Applying) {
            SyncState::ActivityPending(anchor) => Some(anchor),
            other => {
                self.sync = other;
                None
            }
        }
    }

    /// Replaces the model with a freshly scanned snapshot and remaps the
    /// selection through the anchor: assignment and handout by name, grade
    /// check to index 0 (newest), check by id with fallback to index 0.
    pub fn apply_snapshot(&mut self, assignments: Vec<Assignment>, anchor: SelectionAnchor) {
        self.assignments = assignments;
        self.sync = SyncState::Idle;
        let Some((assignment_idx, handout_idx)) =
            self.find_handout(&anchor.assignment, &anchor.handout)
        else {
            // The viewed handout vanished from the new snapshot; fall back
            // to the globally newest run.
            self.select_newest();
            return;
        };
        let handout = &self.assignments[assignment_idx].handouts[handout_idx];
        let check_idx = anchor
            .check_id
            .as_deref()
            .and_then(|id| {
                handout.grade_checks[0]
                    .checks
                    .iter()
                    .position(|check| check.check_id == id)
            })
            .unwrap_or(0);
        self.selection = Some(Selection {
            assignment: assignment_idx,
            handout: handout_idx,
            grade_check: 0,
            check: check_idx,
        });
    }

    /// Background re-index: replaces the model while keeping the logical
    /// selection where it was, remapped through its semantic keys
    /// (timestamp preserved, unlike the debounced apply). The sync state is
    /// left alone: a refresh arriving mid-burst must not drop the anchor a
    /// pending apply will restore from.
    pub fn refresh_snapshot(&mut self, assignments: Vec<Assignment>) {
        let anchor = self.capture_anchor();
        let timestamp = self
            .current_grade_check()
            .map(|run| run.timestamp.clone());
        self.assignments = assignments;

        let Some(anchor) = anchor else {
            self.select_newest();
            return;
        };
        let Some((assignment_idx, handout_idx)) =
            self.find_handout(&anchor.assignment, &anchor.handout)
        else {
            self.select_newest();
            return;
        };
        let handout = &self.assignments[assignment_idx].handouts[handout_idx];
        let grade_check_idx = timestamp
            .and_then(|ts| {
                handout
                    .grade_checks
                    .iter()
                    .position(|run| run.timestamp == ts)
            })
            .unwrap_or(0);
        let check_idx = anchor
            .check_id
            .as_deref()
            .and_then(|id| {
                handout.grade_checks[grade_check_idx]
                    .checks
                    .iter()
                    .position(|check| check.check_id == id)
            })
            .unwrap_or(0);
        self.selection = Some(Selection {
            assignment: assignment_idx,
            handout: handout_idx,
            grade_check: grade_check_idx,
            check: check_idx,
        });
    }

    /// Selects the handout holding the newest grade check anywhere in the
    /// snapshot; clears the selection when the snapshot is empty.
    pub fn select_newest(&mut self) {
        let mut newest: Option<(&str, Selection)> = None;
        for (assignment_idx, assignment) in self.assignments.iter().enumerate() {
            for (handout_idx, handout) in assignment.handouts.iter().enumerate() {
                let Some(run) = handout.grade_checks.first() else {
                    continue;
                };
                let candidate = Selection {
                    assignment: assignment_idx,
                    handout: handout_idx,
                    grade_check: 0,
                    check: 0,
                };
                match newest {
                    Some((timestamp, _)) if timestamp >= run.timestamp.as_str() => {}
                    _ => newest = Some((run.timestamp.as_str(), candidate)),
                }
            }
        }
        self.selection = newest.map(|(_, selection)| selection);
    }

    fn find_handout(&self, assignment_name: &str, handout_name: &str) -> Option<(usize, usize)> {
        let assignment_idx = self
            .assignments
            .iter()
            .position(|assignment| assignment.name == assignment_name)?;
        let handout_idx = self.assignments[assignment_idx]
            .handouts
            .iter()
            .position(|handout| handout.name == handout_name)?;
        Some((assignment_idx, handout_idx))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gb_core::CheckStatus;
    use std::path::PathBuf;

    fn check(id: &str) -> Check {
        Check {
            check_id: id.to_string(),
            filename: format!("{id}-report.html"),
            display_name: gb_core::classify::display_name_for(id),
            status: CheckStatus::Pass,
            path: PathBuf::from(format!("/root/{id}-report.html")),
        }
    }

    fn run(timestamp: &str, check_ids: &[&str]) -> GradeCheck {
        GradeCheck {
            timestamp: timestamp.to_string(),
            path: PathBuf::from(format!("/root/{timestamp}")),
            checks: check_ids.iter().map(|id| check(id)).collect(),
        }
    }

    fn snapshot(handouts: Vec<(&str, Vec<GradeCheck>)>) -> Vec<Assignment> {
        vec![Assignment {
            name: "A".to_string(),
            path: PathBuf::from("/root/A"),
            handouts: handouts
                .into_iter()
                .map(|(name, grade_checks)| Handout {
                    name: name.to_string(),
                    path: PathBuf::from(format!("/root/A/{name}")),
                    grade_checks,
                })
                .collect(),
        }]
    }

    fn viewing_h1() -> Session {
        let mut session = Session::new();
        session.refresh_snapshot(snapshot(vec![(
            "H1",
            vec![run("2024-01-01-00-00-00", &["check00", "check01"])],
        )]));
        session
    }

    const NEW_RUN_PATH: &str = "/root/A/H1/grading/2024-01-02-00-00-00/check01-report.html";

    #[test]
    fn non_report_paths_are_ignored() {
        let mut session = viewing_h1();
        assert_eq!(session.on_report_event("/root/A/H1/notes.txt"), SyncAction::Ignore);
        assert_eq!(session.sync, SyncState::Idle);
    }

    #[test]
    fn events_outside_the_viewed_handout_refresh_in_background() {
        let mut session = viewing_h1();
        let action = session
            .on_report_event("/root/A/H2/grading/2024-01-02-00-00-00/check00-report.html");
        assert_eq!(action, SyncAction::RefreshBackground);
        assert_eq!(session.sync, SyncState::Idle);
    }

    #[test]
    fn same_timestamp_events_refresh_in_background() {
        let mut session = viewing_h1();
        let action = session
            .on_report_event("/root/A/H1/grading/2024-01-01-00-00-00/check00-report.html");
        assert_eq!(action, SyncAction::RefreshBackground);
        assert_eq!(session.sync, SyncState::Idle);
    }

    #[test]
    fn new_timestamp_starts_then_restarts_the_debounce() {
        let mut session = viewing_h1();
        assert_eq!(session.on_report_event(NEW_RUN_PATH), SyncAction::StartDebounce);
        assert!(matches!(session.sync, SyncState::ActivityPending(_)));
        assert_eq!(session.on_report_event(NEW_RUN_PATH), SyncAction::RestartDebounce);
        assert_eq!(session.on_report_event(NEW_RUN_PATH), SyncAction::RestartDebounce);
    }

    #[test]
    fn anchor_captures_the_selected_check_id() {
        let mut session = viewing_h1();
        session.selection.as_mut().expect("selection").check = 1;
        session.on_report_event(NEW_RUN_PATH);
        let anchor = session.begin_apply().expect("anchor");
        assert_eq!(anchor.check_id.as_deref(), Some("check01"));
        assert_eq!(session.sync, SyncState::Applying);
    }

    #[test]
    fn begin_apply_without_pending_activity_yields_nothing() {
        let mut session = viewing_h1();
        assert_eq!(session.begin_apply(), None);
        assert_eq!(session.sync, SyncState::Idle);
    }

    #[test]
    fn reselection_follows_the_check_id_not_the_index() {
        let mut session = viewing_h1();
        session.selection.as_mut().expect("selection").check = 1;
        session.on_report_event(NEW_RUN_PATH);
        let anchor = session.begin_apply().expect("anchor");
        // In the new run the anchored check sits at a different index.
        session.apply_snapshot(
            snapshot(vec![(
                "H1",
                vec![
                    run("2024-01-02-00-00-00", &["check00", "check00-5", "check01"]),
                    run("2024-01-01-00-00-00", &["check00", "check01"]),
                ],
            )]),
            anchor,
        );
        assert_eq!(session.sync, SyncState::Idle);
        let selection = session.selection.expect("selection");
        assert_eq!(selection.grade_check, 0);
        assert_eq!(selection.check, 2);
        assert_eq!(
            session.current_check().expect("check").check_id,
            "check01"
        );
    }

    #[test]
    fn missing_check_id_falls_back_to_index_zero() {
        let mut session = viewing_h1();
        session.selection.as_mut().expect("selection").check = 1;
        session.on_report_event(NEW_RUN_PATH);
        let anchor = session.begin_apply().expect("anchor");
        session.apply_snapshot(
            snapshot(vec![(
                "H1",
                vec![run("2024-01-02-00-00-00", &["check00", "check02"])],
            )]),
            anchor,
        );
        assert_eq!(session.selection.expect("selection").check, 0);
    }

    #[test]
    fn vanished_handout_falls_back_to_newest() {
        let mut session = viewing_h1();
        session.on_report_event(NEW_RUN_PATH);
        let anchor = session.begin_apply().expect("anchor");
        session.apply_snapshot(
            snapshot(vec![(
                "H2",
                vec![run("2024-01-03-00-00-00", &["check00"])],
            )]),
            anchor,
        );
        let handout = session.current_handout().expect("handout");
        assert_eq!(handout.name, "H2");
    }

    #[test]
    fn select_newest_spans_handouts() {
        let mut session = Session::new();
        session.assignments = snapshot(vec![
            ("H1", vec![run("2024-01-05-00-00-00", &["check00"])]),
            ("H2", vec![run("2024-02-01-00-00-00", &["check00"])]),
        ]);
        session.select_newest();
        assert_eq!(session.current_handout().expect("handout").name, "H2");
        let selection = session.selection.expect("selection");
        assert_eq!(selection.grade_check, 0);
        assert_eq!(selection.check, 0);
    }

    #[test]
    fn background_refresh_keeps_the_viewed_timestamp() {
        let mut session = viewing_h1();
        // A newer run appears, but the background path keeps the viewed run.
        session.refresh_snapshot(snapshot(vec![(
            "H1",
            vec![
                run("2024-01-02-00-00-00", &["check00"]),
                run("2024-01-01-00-00-00", &["check00", "check01"]),
            ],
        )]));
        assert_eq!(
            session.current_grade_check().expect("run").timestamp,
            "2024-01-01-00-00-00"
        );
    }

    #[test]
    fn background_refresh_does_not_cancel_a_pending_apply() {
        let mut session = viewing_h1();
        assert_eq!(session.on_report_event(NEW_RUN_PATH), SyncAction::StartDebounce);
        // A refresh for an unrelated handout lands mid-burst.
        session.refresh_snapshot(snapshot(vec![
            ("H1", vec![run("2024-01-01-00-00-00", &["check00", "check01"])]),
            ("H2", vec![run("2024-01-03-00-00-00", &["check00"])]),
        ]));
        assert!(matches!(session.sync, SyncState::ActivityPending(_)));
        let anchor = session.begin_apply().expect("anchor survives the refresh");
        session.apply_snapshot(
            snapshot(vec![
                (
                    "H1",
                    vec![
                        run("2024-01-02-00-00-00", &["check00", "check01"]),
                        run("2024-01-01-00-00-00", &["check00", "check01"]),
                    ],
                ),
                ("H2", vec![run("2024-01-03-00-00-00", &["check00"])]),
            ]),
            anchor,
        );
        // The consolidated apply jumps to the anchored handout's newest run.
        assert_eq!(session.current_handout().expect("handout").name, "H1");
        assert_eq!(
            session.current_grade_check().expect("run").timestamp,
            "2024-01-02-00-00-00"
        );
    }

    #[test]
    fn empty_snapshot_clears_the_selection() {
        let mut session = viewing_h1();
        session.refresh_snapshot(Vec::new());
        assert_eq!(session.selection, None);
    }
}
