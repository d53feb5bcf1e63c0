use regex::Regex;
use std::sync::OnceLock;

/// Every grading report file ends with this suffix; the scanner, the watcher
/// and the viewer all filter on it.
pub const REPORT_SUFFIX: &str = "-report.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCheck {
    pub check_id: String,
    pub display_name: String,
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}$").expect("valid regex")
    })
}

fn report_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.+)-report\.html$").expect("valid regex"))
}

fn dashed_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^check(\d+)-(\d+)$").expect("valid regex"))
}

fn padded4_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^check(\d{2})(\d{2})$").expect("valid regex"))
}

fn padded2_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^check(\d{2})$").expect("valid regex"))
}

fn embedded_timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}").expect("valid regex"))
}

/// Grade-check run directories are named for their wall-clock start,
/// `YYYY-MM-DD-HH-MM-SS`, nothing more and nothing less.
pub fn is_timestamp_dir(name: &str) -> bool {
    timestamp_re().is_match(name)
}

/// Pulls the grade-check timestamp out of a report file path, if any
/// component carries one.
pub fn extract_timestamp(path: &str) -> Option<&str> {
    embedded_timestamp_re().find(path).map(|m| m.as_str())
}

/// Recognizes `<id>-report.html` and derives the human label for the id.
/// Non-report filenames return `None` and are skipped by callers.
pub fn parse_check_file(filename: &str) -> Option<ParsedCheck> {
    let captures = report_file_re().captures(filename)?;
    let check_id = captures.get(1)?.as_str().to_string();
    let display_name = display_name_for(&check_id);
    Some(ParsedCheck {
        check_id,
        display_name,
    })
}

/// One of the three historical naming shapes a check identifier can take.
/// Numbers too wide for `u32` make the id unparseable as a whole.
enum IdShape {
    Dashed(u32, u32),
    Padded4(u32, u32),
    Padded2(u32),
}

fn parse_id_shape(check_id: &str) -> Option<IdShape> {
    if let Some(caps) = dashed_id_re().captures(check_id) {
        return Some(IdShape::Dashed(caps[1].parse().ok()?, caps[2].parse().ok()?));
    }
    if let Some(caps) = padded4_id_re().captures(check_id) {
        return Some(IdShape::Padded4(caps[1].parse().ok()?, caps[2].parse().ok()?));
    }
    if let Some(caps) = padded2_id_re().captures(check_id) {
        return Some(IdShape::Padded2(caps[1].parse().ok()?));
    }
    None
}

/// Task/test pair encoded in a check identifier, if the identifier uses one
/// of the three historical shapes.
fn parse_task_test(check_id: &str) -> Option<(u32, u32)> {
    match parse_id_shape(check_id)? {
        IdShape::Dashed(task, test) | IdShape::Padded4(task, test) => Some((task, test)),
        IdShape::Padded2(task) => Some((task, 0)),
    }
}

/// Display label for a check identifier. The three historical naming shapes
/// are tried in priority order; anything else falls back to the raw id.
pub fn display_name_for(check_id: &str) -> String {
    match parse_id_shape(check_id) {
        Some(IdShape::Dashed(0, _)) => "Compilation".to_string(),
        Some(IdShape::Dashed(task, test)) => format!("Task {task} - Test {test}"),
        Some(IdShape::Padded4(0, 0)) => "Compilation".to_string(),
        Some(IdShape::Padded4(0, test)) => format!("Compilation {test}"),
        Some(IdShape::Padded4(task, test)) => format!("Task {task} - Test {test}"),
        Some(IdShape::Padded2(0)) => "Compilation".to_string(),
        Some(IdShape::Padded2(task)) => format!("Task {task}"),
        None => check_id.to_string(),
    }
}

pub fn is_compilation(display_name: &str) -> bool {
    display_name.starts_with("Compilation")
}

/// Legacy-compatibility fan-out for lookups: a report may be stored under
/// the dashed, 4-digit or 2-digit form of the same identifier, so every
/// lookup path tries all of them before reporting not-found. The raw id is
/// always first; unparseable ids yield only the raw id.
pub fn candidate_stems(check_id: &str) -> Vec<String> {
    let mut stems = vec![check_id.to_string()];
    if let Some((task, test)) = parse_task_test(check_id) {
        let mut push = |stem: String| {
            if !stems.contains(&stem) {
                stems.push(stem);
            }
        };
        push(format!("check{task}-{test}"));
        if task < 100 && test < 100 {
            push(format!("check{task:02}{test:02}"));
        }
        if test == 0 && task < 100 {
            push(format!("check{task:02}"));
        }
    }
    stems
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_dir_requires_exact_shape() {
        assert!(is_timestamp_dir("2024-01-01-00-00-00"));
        assert!(is_timestamp_dir("2026-08-26-23-59-59"));
        assert!(!is_timestamp_dir("2024-01-01"));
        assert!(!is_timestamp_dir("2024-01-01-00-00-00-extra"));
        assert!(!is_timestamp_dir("x2024-01-01-00-00-00"));
        assert!(!is_timestamp_dir("2024-1-01-00-00-00"));
        assert!(!is_timestamp_dir(""));
    }

    #[test]
    fn extracts_embedded_timestamp_from_paths() {
        assert_eq!(
            extract_timestamp("/root/A/H1/grading/2024-01-01-00-00-00/check00-report.html"),
            Some("2024-01-01-00-00-00")
        );
        assert_eq!(extract_timestamp("/root/A/H1/grading/latest/x.html"), None);
    }

    #[test]
    fn non_report_files_are_skipped() {
        assert_eq!(parse_check_file("notes.txt"), None);
        assert_eq!(parse_check_file("check01-report.htm"), None);
        assert_eq!(parse_check_file("-report.html"), None);
    }

    #[test]
    fn dashed_form_task_zero_is_compilation() {
        let parsed = parse_check_file("check0-3-report.html").expect("parses");
        assert_eq!(parsed.check_id, "check0-3");
        assert_eq!(parsed.display_name, "Compilation");
    }

    #[test]
    fn dashed_form_labels_task_and_test() {
        let parsed = parse_check_file("check12-4-report.html").expect("parses");
        assert_eq!(parsed.display_name, "Task 12 - Test 4");
    }

    #[test]
    fn two_digit_form_is_task_only() {
        let parsed = parse_check_file("check12-report.html").expect("parses");
        assert_eq!(parsed.check_id, "check12");
        assert_eq!(parsed.display_name, "Task 12");
        let comp = parse_check_file("check00-report.html").expect("parses");
        assert_eq!(comp.display_name, "Compilation");
    }

    #[test]
    fn four_digit_form_splits_task_and_test() {
        let parsed = parse_check_file("check0003-report.html").expect("parses");
        assert_eq!(parsed.display_name, "Compilation 3");
        let parsed = parse_check_file("check0000-report.html").expect("parses");
        assert_eq!(parsed.display_name, "Compilation");
        let parsed = parse_check_file("check0201-report.html").expect("parses");
        assert_eq!(parsed.display_name, "Task 2 - Test 1");
    }

    #[test]
    fn unknown_shapes_fall_back_to_raw_id() {
        let parsed = parse_check_file("lint-report.html").expect("parses");
        assert_eq!(parsed.check_id, "lint");
        assert_eq!(parsed.display_name, "lint");
        let parsed = parse_check_file("check123-report.html").expect("parses");
        assert_eq!(parsed.display_name, "check123");
    }

    #[test]
    fn overflow_width_numbers_fall_back_to_raw_id() {
        // Wider than u32: the id is unparseable, so it must not be labeled
        // as if the task were zero.
        assert_eq!(
            display_name_for("check99999999999-1"),
            "check99999999999-1"
        );
        assert_eq!(
            candidate_stems("check99999999999-1"),
            vec!["check99999999999-1"]
        );
    }

    #[test]
    fn candidate_stems_cover_all_legacy_forms() {
        assert_eq!(
            candidate_stems("check0-3"),
            vec!["check0-3", "check0003"]
        );
        assert_eq!(
            candidate_stems("check0003"),
            vec!["check0003", "check0-3"]
        );
        assert_eq!(
            candidate_stems("check02"),
            vec!["check02", "check2-0", "check0200"]
        );
        assert_eq!(
            candidate_stems("check2-0"),
            vec!["check2-0", "check0200", "check02"]
        );
        assert_eq!(candidate_stems("lint"), vec!["lint"]);
    }

    #[test]
    fn compilation_detection_uses_display_name_prefix() {
        assert!(is_compilation("Compilation"));
        assert!(is_compilation("Compilation 3"));
        assert!(!is_compilation("Task 1 - Test 2"));
    }
}
