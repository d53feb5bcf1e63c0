pub mod classify;
pub mod model;
pub mod status;

pub use classify::{
    candidate_stems, extract_timestamp, is_compilation, is_timestamp_dir, parse_check_file,
    ParsedCheck, REPORT_SUFFIX,
};
pub use model::{Assignment, Check, CheckStatus, GradeCheck, Handout};
pub use status::classify_report;
