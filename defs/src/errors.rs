use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The path does not exist at this ref, e.g. a chart added by the pull request.
    #[error("{path} does not exist at ref {git_ref}")]
    NotFound { path: String, git_ref: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum OutcomeError {
    #[error("A changed outcome for {chart}/{environment} needs at least one non-empty diff")]
    EmptyDiff { chart: String, environment: String },
}
