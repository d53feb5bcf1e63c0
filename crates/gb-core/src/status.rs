use crate::model::CheckStatus;

// Marker literals the grading pipeline embeds in report HTML. The report
// body is free text, so these are substring probes, not a parse; the
// contract is determinism and the priority order below, not semantic
// accuracy (the same words inside student output will misclassify).
const COMPILE_FAILURE_MARKER: &str = "Compilation failed";
const ERROR_SECTION_MARKER: &str = "Errors during grading";
const NO_ERRORS_PLACEHOLDER: &str = "No errors during grading";
const FAILED_TEST_MARKER: &str = "Test failed";
const EXCEPTION_MARKER: &str = "Exception";
const STACK_FRAME_MARKER: &str = "\tat ";
const PASSED_MARKER: &str = "Test passed";

/// Derives a check outcome from report text. Evaluated in fixed priority so
/// that a report matching multiple signals resolves deterministically:
/// compile failure beats everything, any failure signal beats a passed
/// marker.
pub fn classify_report(text: &str) -> CheckStatus {
    if text.contains(COMPILE_FAILURE_MARKER) {
        return CheckStatus::Error;
    }
    let error_section =
        text.contains(ERROR_SECTION_MARKER) && !text.contains(NO_ERRORS_PLACEHOLDER);
    let exception =
        text.contains(EXCEPTION_MARKER) && text.contains(STACK_FRAME_MARKER);
    if error_section || text.contains(FAILED_TEST_MARKER) || exception {
        return CheckStatus::Fail;
    }
    if text.contains(PASSED_MARKER) {
        return CheckStatus::Pass;
    }
    CheckStatus::Unknown
}
