use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use gate_defs::{
    ChangedChart, ChartConfiguration, ChartSource, ConfigSource, EnvironmentDescriptor,
    FetchError, PullRequestContext,
};
use log::{debug, info, warn};

use crate::index::ConfigIndex;

pub const DEFAULT_ENV_DIR: &str = "env";
pub const DEFAULT_VALUES_SUFFIX: &str = "-values.yaml";

/// Tries each source in order and falls back to a "not deployed" placeholder.
pub struct ChartConfigResolver {
    sources: Vec<Arc<dyn ConfigSource>>,
}

impl ChartConfigResolver {
    pub fn new(sources: Vec<Arc<dyn ConfigSource>>) -> Self {
        ChartConfigResolver { sources }
    }

    pub async fn resolve(
        &self,
        pr: &PullRequestContext,
        chart: &ChangedChart,
        trees: &dyn ChartSource,
    ) -> Result<ChartConfiguration, anyhow::Error> {
        if chart.name.trim().is_empty() {
            bail!("Cannot resolve configuration for a chart without a name");
        }

        for source in &self.sources {
            match source.environments_for(pr, chart, trees).await {
                Ok(Some(config)) if !config.environments.is_empty() => {
                    info!(
                        "Resolved {} environment(s) for {} from {}",
                        config.environments.len(),
                        chart.name,
                        source.name()
                    );
                    return Ok(config);
                }
                Ok(_) => debug!("{} has no configuration for {}", source.name(), chart.name),
                Err(e) => warn!(
                    "Config source {} failed for {}: {:#}",
                    source.name(),
                    chart.name,
                    e
                ),
            }
        }

        info!(
            "No environments found for {}, checking base chart only",
            chart.name
        );
        Ok(ChartConfiguration::not_deployed(chart.path.clone()))
    }
}

/// Environments from the Argo CD application index.
pub struct IndexSource {
    index: Arc<ConfigIndex>,
}

impl IndexSource {
    pub fn new(index: Arc<ConfigIndex>) -> Self {
        IndexSource { index }
    }
}

/// A chart identifier from an Application is a repository path only when it has a
/// directory component; bare names come from chart registries.
fn looks_like_repo_path(identifier: &str) -> bool {
    identifier.contains('/') && !identifier.contains("://")
}

#[async_trait]
impl ConfigSource for IndexSource {
    fn name(&self) -> &str {
        "argo-index"
    }

    async fn environments_for(
        &self,
        _pr: &PullRequestContext,
        chart: &ChangedChart,
        _trees: &dyn ChartSource,
    ) -> Result<Option<ChartConfiguration>, anyhow::Error> {
        let entries = self.index.lookup(&chart.name);
        let first = match entries.first() {
            Some(first) => first,
            None => return Ok(None),
        };

        let chart_path = if looks_like_repo_path(&first.chart_path) {
            first.chart_path.trim_end_matches('/').to_string()
        } else {
            chart.path.clone()
        };
        let environments = entries
            .iter()
            .map(|entry| EnvironmentDescriptor::new(&entry.environment, entry.value_files.clone()))
            .collect();

        Ok(Some(ChartConfiguration {
            chart_path,
            environments,
        }))
    }
}

/// Environments from `<chart>/env/<name>-values.yaml` files on the head ref.
pub struct DirectoryConventionSource {
    env_dir: String,
    suffix: String,
}

impl Default for DirectoryConventionSource {
    fn default() -> Self {
        DirectoryConventionSource::new()
    }
}

impl DirectoryConventionSource {
    pub fn new() -> Self {
        DirectoryConventionSource {
            env_dir: DEFAULT_ENV_DIR.to_string(),
            suffix: DEFAULT_VALUES_SUFFIX.to_string(),
        }
    }

    pub fn with_layout(mut self, env_dir: &str, suffix: &str) -> Self {
        self.env_dir = env_dir.to_string();
        self.suffix = suffix.to_string();
        self
    }
}

#[async_trait]
impl ConfigSource for DirectoryConventionSource {
    fn name(&self) -> &str {
        "directory-convention"
    }

    async fn environments_for(
        &self,
        pr: &PullRequestContext,
        chart: &ChangedChart,
        trees: &dyn ChartSource,
    ) -> Result<Option<ChartConfiguration>, anyhow::Error> {
        let checkout = match trees
            .fetch_chart(&pr.owner, &pr.repo, &pr.head_ref, &chart.path)
            .await
        {
            Ok(checkout) => checkout,
            Err(FetchError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let env_dir = checkout.dir().join(&self.env_dir);
        if !env_dir.is_dir() {
            return Ok(None);
        }

        let environments: Vec<EnvironmentDescriptor> =
            gate_utils::files_with_suffix(&env_dir, &self.suffix)?
                .into_iter()
                .map(|(name, file)| {
                    EnvironmentDescriptor::new(name, vec![format!("{}/{}", self.env_dir, file)])
                })
                .collect();

        if environments.is_empty() {
            return Ok(None);
        }
        Ok(Some(ChartConfiguration {
            chart_path: chart.path.clone(),
            environments,
        }))
    }
}
