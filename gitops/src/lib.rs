mod event;
mod github;
mod report;
mod signature;

pub use event::{parse_pull_request_event, EventError, PULL_REQUEST_EVENT};
pub use github::{
    chart_dirs_from_files, parse_chart_name, GitHubAuth, GitHubClient, GITHUB_API_URL,
};
pub use report::{
    check_run_output, comment_marker, conclusion, format_comment, truncate, CHECK_TITLE,
    IN_PROGRESS_SUMMARY, MAX_CHECK_TEXT, MAX_COMMENT_BODY, TRUNCATION_SUFFIX,
};
pub use signature::{sign, verify_signature, SignatureError};
