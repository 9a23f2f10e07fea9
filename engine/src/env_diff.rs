use std::sync::Arc;

use gate_defs::{
    ChangedChart, ChartCheckout, ChartConfiguration, ChartSource, DiffOutcome, DiffStrategy,
    DiffTarget, EnvironmentDescriptor, FetchError, PullRequestContext, Renderer,
    NO_CHANGES_SUMMARY,
};
use futures::future::join_all;
use log::{info, warn};
use tokio::sync::Semaphore;

use crate::differ::unified_diff;

/// Renders and diffs every environment of a chart, with a cap on how many run at once.
pub struct EnvironmentDiffer {
    renderer: Arc<dyn Renderer>,
    semantic: Arc<dyn DiffStrategy>,
    line: Arc<dyn DiffStrategy>,
    max_concurrency: Option<usize>,
}

/// State of the base tree for a chart.
enum BaseTree {
    Present(Arc<ChartCheckout>),
    /// The chart does not exist on the base ref yet.
    Absent,
}

impl EnvironmentDiffer {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        semantic: Arc<dyn DiffStrategy>,
        line: Arc<dyn DiffStrategy>,
    ) -> Self {
        EnvironmentDiffer {
            renderer,
            semantic,
            line,
            max_concurrency: None,
        }
    }

    /// `None` runs every environment of a chart at once.
    pub fn with_max_concurrency(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// One outcome per environment, in the same order as `config.environments`.
    /// Base and head trees are fetched through `trees`.
    pub async fn process_chart(
        &self,
        pr: &PullRequestContext,
        chart: &ChangedChart,
        config: &ChartConfiguration,
        trees: &dyn ChartSource,
    ) -> Vec<DiffOutcome> {
        let environments = &config.environments;
        let targets: Vec<DiffTarget> = environments
            .iter()
            .map(|env| DiffTarget::new(&chart.name, &env.name, &pr.base_ref, &pr.head_ref))
            .collect();

        if !environments.iter().any(|env| env.is_renderable()) {
            return environments
                .iter()
                .zip(targets)
                .map(|(env, target)| message_outcome(env, target))
                .collect();
        }

        let (base, head) = match fetch_trees(trees, pr, &config.chart_path).await {
            Ok(trees) => trees,
            Err(summary) => {
                warn!("{}: {}", chart.name, summary);
                return environments
                    .iter()
                    .zip(targets)
                    .map(|(env, target)| {
                        if env.is_renderable() {
                            DiffOutcome::failed(target, summary.clone())
                        } else {
                            message_outcome(env, target)
                        }
                    })
                    .collect();
            }
        };

        let permits = self
            .max_concurrency
            .unwrap_or(environments.len())
            .max(1);
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut handles = Vec::with_capacity(environments.len());
        for (env, target) in environments.iter().zip(targets.iter()) {
            let semaphore = semaphore.clone();
            let renderer = self.renderer.clone();
            let semantic = self.semantic.clone();
            let line = self.line.clone();
            let base = match &base {
                BaseTree::Present(checkout) => Some(checkout.clone()),
                BaseTree::Absent => None,
            };
            let head = head.clone();
            let env = env.clone();
            let target = target.clone();

            handles.push(tokio::spawn(gate_utils::inherit_delivery_id(async move {
                let _permit = semaphore.acquire_owned().await;
                diff_environment(
                    renderer.as_ref(),
                    semantic.as_ref(),
                    line.as_ref(),
                    base.as_deref(),
                    &head,
                    &env,
                    target,
                )
                .await
            })));
        }

        let mut slots: Vec<Option<DiffOutcome>> = vec![None; handles.len()];
        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            slots[index] = Some(match joined {
                Ok(outcome) => outcome,
                Err(e) => DiffOutcome::failed(
                    targets[index].clone(),
                    format!("Diff worker crashed: {}", e),
                ),
            });
        }

        slots
            .into_iter()
            .zip(targets)
            .map(|(slot, target)| {
                slot.unwrap_or_else(|| DiffOutcome::failed(target, "Diff worker produced no result"))
            })
            .collect()
    }
}

/// Base and head trees, fetched once for all environments.
async fn fetch_trees(
    trees: &dyn ChartSource,
    pr: &PullRequestContext,
    chart_path: &str,
) -> Result<(BaseTree, Arc<ChartCheckout>), String> {
    let base = match trees
        .fetch_chart(&pr.owner, &pr.repo, &pr.base_ref, chart_path)
        .await
    {
        Ok(checkout) => BaseTree::Present(Arc::new(checkout)),
        Err(FetchError::NotFound { .. }) => {
            info!(
                "{} does not exist on {}, treating as a new chart",
                chart_path, pr.base_ref
            );
            BaseTree::Absent
        }
        Err(e) => {
            return Err(format!(
                "Failed to fetch base chart at {}: {:#}",
                pr.base_ref, e
            ))
        }
    };

    let head = trees
        .fetch_chart(&pr.owner, &pr.repo, &pr.head_ref, chart_path)
        .await
        .map_err(|e| format!("Failed to fetch head chart at {}: {:#}", pr.head_ref, e))?;

    Ok((base, Arc::new(head)))
}

fn message_outcome(env: &EnvironmentDescriptor, target: DiffTarget) -> DiffOutcome {
    DiffOutcome::unchanged(
        target,
        env.message.clone().unwrap_or_else(|| NO_CHANGES_SUMMARY.to_string()),
    )
}

async fn diff_environment(
    renderer: &dyn Renderer,
    semantic: &dyn DiffStrategy,
    line: &dyn DiffStrategy,
    base: Option<&ChartCheckout>,
    head: &ChartCheckout,
    env: &EnvironmentDescriptor,
    target: DiffTarget,
) -> DiffOutcome {
    if !env.is_renderable() {
        return message_outcome(env, target);
    }

    let base_manifest = match base {
        Some(checkout) => match renderer.render(checkout.dir(), &env.value_files).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return DiffOutcome::failed(
                    target.clone(),
                    format!("Failed to render base ({}): {:#}", target.base_ref, e),
                )
            }
        },
        None => Vec::new(),
    };

    let head_manifest = match renderer.render(head.dir(), &env.value_files).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return DiffOutcome::failed(
                target.clone(),
                format!("Failed to render head ({}): {:#}", target.head_ref, e),
            )
        }
    };

    classify(semantic, line, target, &base_manifest, &head_manifest).await
}

/// Equal bytes are unchanged. Otherwise changed, with a line diff computed
/// in-process if both strategies come back empty.
pub(crate) async fn classify(
    semantic: &dyn DiffStrategy,
    line: &dyn DiffStrategy,
    target: DiffTarget,
    base: &[u8],
    head: &[u8],
) -> DiffOutcome {
    if base == head {
        return DiffOutcome::unchanged(target, NO_CHANGES_SUMMARY);
    }

    let base_label = target.base_label();
    let head_label = target.head_label();
    let semantic_diff = semantic
        .compute_diff(&base_label, &head_label, base, head)
        .await;
    let mut line_diff = line.compute_diff(&base_label, &head_label, base, head).await;
    if semantic_diff.trim().is_empty() && line_diff.trim().is_empty() {
        line_diff = unified_diff(&base_label, &head_label, base, head);
    }

    match DiffOutcome::changed(target.clone(), semantic_diff, line_diff) {
        Ok(outcome) => outcome,
        Err(e) => DiffOutcome::failed(target, e.to_string()),
    }
}
