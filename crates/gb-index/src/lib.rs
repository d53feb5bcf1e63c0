use gb_core::{
    candidate_stems, classify_report, is_timestamp_dir, parse_check_file, Assignment, Check,
    CheckStatus, GradeCheck, Handout, REPORT_SUFFIX,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const GRADING_DIR: &str = "grading";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid root: {} is not a directory", .0.display())]
    InvalidRoot(PathBuf),
    #[error("report not found: {handout}/{timestamp}/{check_id}")]
    ReportNotFound {
        handout: String,
        timestamp: String,
        check_id: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks that a prospective scan root exists and is a directory. Called
/// before any root switch so a bad path never becomes server state.
pub fn validate_root(path: &Path) -> Result<PathBuf, IndexError> {
    if path.is_dir() {
        Ok(path.to_path_buf())
    } else {
        Err(IndexError::InvalidRoot(path.to_path_buf()))
    }
}

/// Walks the full tree and materializes a fresh snapshot. Every call
/// re-walks from scratch; freshness over cost. Filesystem errors at any
/// level are swallowed: the node contributes nothing and siblings continue.
/// The tree is externally owned and mutated while we read it.
///
/// Layout: `root/<assignment>/<handout>/grading/<timestamp>/<check>-report.html`.
/// Nodes that end up empty are pruned, so every emitted assignment has at
/// least one handout, every handout at least one grade check, every grade
/// check at least one check.
pub fn scan(root: &Path) -> Vec<Assignment> {
    let mut assignments: Vec<Assignment> = sorted_subdirs(root)
        .into_iter()
        .filter_map(|dir| {
            let handouts = scan_assignment(&dir);
            if handouts.is_empty() {
                return None;
            }
            Some(Assignment {
                name: dir_name(&dir),
                path: dir,
                handouts,
            })
        })
        .collect();
    assignments.sort_by(|a, b| a.name.cmp(&b.name));
    assignments
}

fn scan_assignment(assignment_dir: &Path) -> Vec<Handout> {
    let mut handouts: Vec<Handout> = sorted_subdirs(assignment_dir)
        .into_iter()
        .filter_map(|dir| {
            let grade_checks = scan_handout(&dir);
            if grade_checks.is_empty() {
                return None;
            }
            Some(Handout {
                name: dir_name(&dir),
                path: dir,
                grade_checks,
            })
        })
        .collect();
    handouts.sort_by(|a, b| a.name.cmp(&b.name));
    handouts
}

fn scan_handout(handout_dir: &Path) -> Vec<GradeCheck> {
    let grading = handout_dir.join(GRADING_DIR);
    let mut grade_checks: Vec<GradeCheck> = sorted_subdirs(&grading)
        .into_iter()
        .filter(|dir| is_timestamp_dir(&dir_name(dir)))
        .filter_map(|dir| {
            let checks = scan_grade_check(&dir);
            if checks.is_empty() {
                return None;
            }
            Some(GradeCheck {
                timestamp: dir_name(&dir),
                path: dir,
                checks,
            })
        })
        .collect();
    // Newest first; the fixed-width timestamp makes this chronological.
    grade_checks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    grade_checks
}

fn scan_grade_check(timestamp_dir: &Path) -> Vec<Check> {
    let entries = match fs::read_dir(timestamp_dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(event = "scan_skip", path = %timestamp_dir.display(), error = %err);
            return Vec::new();
        }
    };
    let mut checks = Vec::new();
    for entry in entries.flatten() {
        let filename = entry.file_name().to_string_lossy().to_string();
        let Some(parsed) = parse_check_file(&filename) else {
            continue;
        };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let status = match fs::read_to_string(&path) {
            Ok(body) => classify_report(&body),
            Err(err) => {
                // The filename already matched; keep the entry and let the
                // next scan pick up the body once it is readable.
                debug!(event = "report_unreadable", path = %path.display(), error = %err);
                CheckStatus::Unknown
            }
        };
        checks.push(Check {
            check_id: parsed.check_id,
            filename,
            display_name: parsed.display_name,
            status,
            path,
        });
    }
    GradeCheck::sort_checks(&mut checks);
    checks
}

/// Targeted lookup of one report body path, without materializing the full
/// tree. Tries every legacy identifier form before giving up; the file may
/// be stored under the dashed, 4-digit or 2-digit spelling of the same id.
pub fn find_report(
    root: &Path,
    handout_name: &str,
    timestamp: &str,
    check_id: &str,
) -> Result<PathBuf, IndexError> {
    if is_timestamp_dir(timestamp) {
        for assignment_dir in sorted_subdirs(root) {
            let timestamp_dir = assignment_dir
                .join(handout_name)
                .join(GRADING_DIR)
                .join(timestamp);
            if !timestamp_dir.is_dir() {
                continue;
            }
            for stem in candidate_stems(check_id) {
                let candidate = timestamp_dir.join(format!("{stem}{REPORT_SUFFIX}"));
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }
    }
    Err(IndexError::ReportNotFound {
        handout: handout_name.to_string(),
        timestamp: timestamp.to_string(),
        check_id: check_id.to_string(),
    })
}

/// Locates and reads one report body. A file that vanishes between the
/// locate and the read surfaces as an io error, not a panic; the tree is
/// mutated underneath us by design.
pub fn fetch_report(
    root: &Path,
    handout_name: &str,
    timestamp: &str,
    check_id: &str,
) -> Result<String, IndexError> {
    let path = find_report(root, handout_name, timestamp, check_id)?;
    Ok(fs::read_to_string(path)?)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn sorted_subdirs(path: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(event = "scan_skip", path = %path.display(), error = %err);
            return Vec::new();
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}
