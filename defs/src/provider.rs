use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{
    ChangedChart, ChartConfiguration, DiffOutcome, FetchError, PullRequestContext,
};

#[async_trait]
pub trait ChangeDetector: Send + Sync {
    /// Distinct charts touched by the pull request, in the order they were first seen.
    async fn changed_charts(
        &self,
        pr: &PullRequestContext,
    ) -> Result<Vec<ChangedChart>, anyhow::Error>;
}

#[async_trait]
pub trait ChartSource: Send + Sync {
    async fn fetch_chart(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<ChartCheckout, FetchError>;
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, chart_dir: &Path, value_files: &[String])
        -> Result<Vec<u8>, anyhow::Error>;
}

#[async_trait]
pub trait DiffStrategy: Send + Sync {
    /// Returns an empty string when there is no difference or the diff could not be computed.
    async fn compute_diff(
        &self,
        base_label: &str,
        head_label: &str,
        base: &[u8],
        head: &[u8],
    ) -> String;
}

#[async_trait]
pub trait Reporter: Send + Sync {
    async fn create_in_progress_check(&self, pr: &PullRequestContext)
        -> Result<u64, anyhow::Error>;
    async fn update_check_with_results(
        &self,
        pr: &PullRequestContext,
        check_id: u64,
        outcomes: &[DiffOutcome],
    ) -> Result<(), anyhow::Error>;
    /// Replaces any earlier comment for the same chart.
    async fn post_comment(
        &self,
        pr: &PullRequestContext,
        outcomes: &[DiffOutcome],
    ) -> Result<(), anyhow::Error>;
}

/// One strategy for finding the environments a chart is deployed to.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` means this source has nothing for the chart. Chart files are read
    /// through `trees`, which is shared with the differ for the same chart.
    async fn environments_for(
        &self,
        pr: &PullRequestContext,
        chart: &ChangedChart,
        trees: &dyn ChartSource,
    ) -> Result<Option<ChartConfiguration>, anyhow::Error>;
}

#[async_trait]
pub trait DiffRunner: Send + Sync {
    async fn execute(&self, pr: PullRequestContext) -> Result<(), anyhow::Error>;
}

/// Called by the repository mirror after every successful refresh.
#[async_trait]
pub trait RefreshHook: Send + Sync {
    async fn on_refresh(&self, root: &Path) -> Result<(), anyhow::Error>;
}

type Cleanup = Box<dyn FnOnce() + Send + Sync>;

/// A chart directory on local disk. The cleanup callback runs when the checkout is dropped.
pub struct ChartCheckout {
    dir: PathBuf,
    cleanup: Option<Cleanup>,
}

impl ChartCheckout {
    pub fn new(dir: PathBuf, cleanup: impl FnOnce() + Send + Sync + 'static) -> Self {
        ChartCheckout {
            dir,
            cleanup: Some(Box::new(cleanup)),
        }
    }

    pub fn without_cleanup(dir: PathBuf) -> Self {
        ChartCheckout { dir, cleanup: None }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for ChartCheckout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartCheckout")
            .field("dir", &self.dir)
            .finish()
    }
}

impl Drop for ChartCheckout {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}
