mod chart;
mod diff;
mod errors;
mod gitprovider;
mod index;
mod provider;
mod pull_request;

pub use chart::{
    ChartConfiguration, EnvironmentDescriptor, BASE_ENVIRONMENT, NOT_DEPLOYED_MESSAGE,
};
pub use diff::{
    count_by_status, diff_label, group_by_chart, DiffOutcome, DiffStatus, DiffTarget,
    StatusCounts, NO_CHANGES_SUMMARY,
};
pub use errors::{FetchError, OutcomeError};
pub use gitprovider::{
    CheckRun, CheckRunCreated, CheckRunOutput, CheckRunUpdate, GitRef, Installation,
    IssueComment, Owner, PullRequest, PullRequestEvent, PullRequestFile, Repository,
};
pub use index::{IndexEntry, IndexSnapshot};
pub use provider::{
    ChangeDetector, ChartCheckout, ChartSource, ConfigSource, DiffRunner, DiffStrategy,
    RefreshHook, Renderer, Reporter,
};
pub use pull_request::{ChangedChart, PullRequestContext};
