use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::classify::is_compilation;

/// One top-level directory under the scan root. Snapshot entities carry no
/// stable ids; consumers hold positions into the ordered sequences and must
/// re-resolve them through the semantic keys (`name`, `timestamp`,
/// `check_id`) whenever a new snapshot replaces the old one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub path: PathBuf,
    pub handouts: Vec<Handout>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Handout {
    pub name: String,
    pub path: PathBuf,
    pub grade_checks: Vec<GradeCheck>,
}

/// One timestamped grading run. The timestamp string is fixed-width and
/// zero-padded, so the descending lexicographic order is the chronological
/// order: index 0 is always the newest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeCheck {
    pub timestamp: String,
    pub path: PathBuf,
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub check_id: String,
    pub filename: String,
    pub display_name: String,
    pub status: CheckStatus,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
    Error,
    Unknown,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "pass",
            CheckStatus::Fail => "fail",
            CheckStatus::Error => "error",
            CheckStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "pass" => Ok(CheckStatus::Pass),
            "fail" => Ok(CheckStatus::Fail),
            "error" => Ok(CheckStatus::Error),
            "unknown" => Ok(CheckStatus::Unknown),
            other => Err(format!("Unknown status: {other}")),
        }
    }
}

impl GradeCheck {
    /// Compilation entries first, then ascending by check id.
    pub fn sort_checks(checks: &mut Vec<Check>) {
        checks.sort_by(|a, b| {
            let a_comp = is_compilation(&a.display_name);
            let b_comp = is_compilation(&b.display_name);
            b_comp
                .cmp(&a_comp)
                .then_with(|| a.check_id.cmp(&b.check_id))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn check(id: &str, display: &str) -> Check {
        Check {
            check_id: id.to_string(),
            filename: format!("{id}-report.html"),
            display_name: display.to_string(),
            status: CheckStatus::Unknown,
            path: Path::new("/tmp").join(format!("{id}-report.html")),
        }
    }

    #[test]
    fn compilation_sorts_first_even_against_lexically_smaller_ids() {
        let mut checks = vec![
            check("alpha", "alpha"),
            check("check1-2", "Task 1 - Test 2"),
            check("check0-0", "Compilation"),
        ];
        GradeCheck::sort_checks(&mut checks);
        assert_eq!(checks[0].check_id, "check0-0");
        assert_eq!(checks[1].check_id, "alpha");
        assert_eq!(checks[2].check_id, "check1-2");
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CheckStatus::Pass).expect("serialize"),
            "\"pass\""
        );
        assert_eq!("fail".parse::<CheckStatus>(), Ok(CheckStatus::Fail));
    }

    #[test]
    fn check_serializes_camel_case() {
        let value = serde_json::to_value(check("check01", "Task 1")).expect("serialize");
        assert!(value.get("checkId").is_some());
        assert!(value.get("displayName").is_some());
    }
}
