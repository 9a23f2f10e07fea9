use std::sync::Arc;

use async_trait::async_trait;
use gate_defs::{
    count_by_status, group_by_chart, ChangeDetector, ChartSource, DiffOutcome, DiffRunner,
    PullRequestContext, Reporter,
};
use log::{error, info, warn};

use crate::checkouts::CheckoutMemo;
use crate::env_diff::EnvironmentDiffer;
use crate::resolver::ChartConfigResolver;

/// Runs the whole diff for one pull request and reports the results.
pub struct DiffOrchestrator {
    detector: Arc<dyn ChangeDetector>,
    source: Arc<dyn ChartSource>,
    resolver: Arc<ChartConfigResolver>,
    differ: Arc<EnvironmentDiffer>,
    reporter: Arc<dyn Reporter>,
}

impl DiffOrchestrator {
    pub fn new(
        detector: Arc<dyn ChangeDetector>,
        source: Arc<dyn ChartSource>,
        resolver: Arc<ChartConfigResolver>,
        differ: Arc<EnvironmentDiffer>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        DiffOrchestrator {
            detector,
            source,
            resolver,
            differ,
            reporter,
        }
    }

    async fn post_comments(&self, pr: &PullRequestContext, outcomes: &[DiffOutcome]) {
        for (chart, chart_outcomes) in group_by_chart(outcomes) {
            if !chart_outcomes.iter().any(|o| o.needs_attention()) {
                continue;
            }
            let chart_outcomes: Vec<DiffOutcome> = chart_outcomes.into_iter().cloned().collect();
            if let Err(e) = self.reporter.post_comment(pr, &chart_outcomes).await {
                error!("{}: failed to comment for chart {}: {:#}", pr, chart, e);
            }
        }
    }
}

#[async_trait]
impl DiffRunner for DiffOrchestrator {
    async fn execute(&self, pr: PullRequestContext) -> Result<(), anyhow::Error> {
        let charts = self.detector.changed_charts(&pr).await?;
        if charts.is_empty() {
            info!("{}: no chart changes, nothing to do", pr);
            return Ok(());
        }
        info!(
            "{}: {} changed chart(s): {}",
            pr,
            charts.len(),
            charts
                .iter()
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let check_id = self.reporter.create_in_progress_check(&pr).await?;

        let mut outcomes: Vec<DiffOutcome> = Vec::new();
        for chart in &charts {
            // Trees live until this chart's outcomes are in
            let trees = CheckoutMemo::new(self.source.clone());
            let config = match self.resolver.resolve(&pr, chart, &trees).await {
                Ok(config) => config,
                Err(e) => {
                    warn!("{}: skipping chart {}: {:#}", pr, chart.name, e);
                    continue;
                }
            };
            outcomes.extend(self.differ.process_chart(&pr, chart, &config, &trees).await);
        }

        let counts = count_by_status(&outcomes);
        info!(
            "{}: {} changed, {} unchanged, {} failed",
            pr, counts.changed, counts.unchanged, counts.failed
        );

        if let Err(e) = self
            .reporter
            .update_check_with_results(&pr, check_id, &outcomes)
            .await
        {
            error!("{}: failed to update check run {}: {:#}", pr, check_id, e);
        }

        self.post_comments(&pr, &outcomes).await;
        Ok(())
    }
}
