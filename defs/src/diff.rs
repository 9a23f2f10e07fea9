use serde::{Deserialize, Serialize};

use crate::errors::OutcomeError;

pub const NO_CHANGES_SUMMARY: &str = "No changes detected.";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffStatus {
    Unchanged,
    Changed,
    Failed,
}

impl DiffStatus {
    pub fn label(&self) -> &'static str {
        match self {
            DiffStatus::Unchanged => "No Changes",
            DiffStatus::Changed => "Changed",
            DiffStatus::Failed => "Error",
        }
    }
}

impl std::fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The chart/environment pair a diff was computed for, and the refs it compared.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DiffTarget {
    pub chart: String,
    pub environment: String,
    pub base_ref: String,
    pub head_ref: String,
}

impl DiffTarget {
    pub fn new(chart: &str, environment: &str, base_ref: &str, head_ref: &str) -> Self {
        DiffTarget {
            chart: chart.to_string(),
            environment: environment.to_string(),
            base_ref: base_ref.to_string(),
            head_ref: head_ref.to_string(),
        }
    }

    pub fn base_label(&self) -> String {
        diff_label(&self.chart, &self.environment, &self.base_ref)
    }

    pub fn head_label(&self) -> String {
        diff_label(&self.chart, &self.environment, &self.head_ref)
    }
}

/// Result of diffing one environment of one chart.
///
/// Only constructible through `unchanged`, `changed` and `failed`, which keep
/// the status consistent with the diff texts and summary.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DiffOutcome {
    target: DiffTarget,
    status: DiffStatus,
    semantic_diff: String,
    line_diff: String,
    summary: String,
}

impl DiffOutcome {
    pub fn unchanged(target: DiffTarget, summary: impl Into<String>) -> Self {
        DiffOutcome {
            target,
            status: DiffStatus::Unchanged,
            semantic_diff: String::new(),
            line_diff: String::new(),
            summary: summary.into(),
        }
    }

    pub fn changed(
        target: DiffTarget,
        semantic_diff: String,
        line_diff: String,
    ) -> Result<Self, OutcomeError> {
        if semantic_diff.trim().is_empty() && line_diff.trim().is_empty() {
            return Err(OutcomeError::EmptyDiff {
                chart: target.chart,
                environment: target.environment,
            });
        }
        let summary = format!(
            "Changes detected in {} for environment {}.",
            target.chart, target.environment
        );
        Ok(DiffOutcome {
            target,
            status: DiffStatus::Changed,
            semantic_diff,
            line_diff,
            summary,
        })
    }

    /// An empty summary is replaced with a generic one naming the target.
    pub fn failed(target: DiffTarget, summary: impl Into<String>) -> Self {
        let mut summary = summary.into();
        if summary.trim().is_empty() {
            summary = format!(
                "Diff failed for {}/{}",
                target.chart, target.environment
            );
        }
        DiffOutcome {
            target,
            status: DiffStatus::Failed,
            semantic_diff: String::new(),
            line_diff: String::new(),
            summary,
        }
    }

    pub fn target(&self) -> &DiffTarget {
        &self.target
    }

    pub fn chart(&self) -> &str {
        &self.target.chart
    }

    pub fn environment(&self) -> &str {
        &self.target.environment
    }

    pub fn base_ref(&self) -> &str {
        &self.target.base_ref
    }

    pub fn head_ref(&self) -> &str {
        &self.target.head_ref
    }

    pub fn status(&self) -> DiffStatus {
        self.status
    }

    pub fn semantic_diff(&self) -> &str {
        &self.semantic_diff
    }

    pub fn line_diff(&self) -> &str {
        &self.line_diff
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Semantic diff when there is one, otherwise the line diff.
    pub fn preferred_diff(&self) -> &str {
        if !self.semantic_diff.trim().is_empty() {
            &self.semantic_diff
        } else {
            &self.line_diff
        }
    }

    pub fn needs_attention(&self) -> bool {
        matches!(self.status, DiffStatus::Changed | DiffStatus::Failed)
    }
}

/// Header used for both sides of a rendered diff, e.g. `my-app/prod (main)`.
pub fn diff_label(chart: &str, environment: &str, git_ref: &str) -> String {
    format!("{}/{} ({})", chart, environment, git_ref)
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub unchanged: usize,
    pub changed: usize,
    pub failed: usize,
}

pub fn count_by_status(outcomes: &[DiffOutcome]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for outcome in outcomes {
        match outcome.status() {
            DiffStatus::Unchanged => counts.unchanged += 1,
            DiffStatus::Changed => counts.changed += 1,
            DiffStatus::Failed => counts.failed += 1,
        }
    }
    counts
}

/// Groups outcomes per chart, keeping the order in which charts first appear.
pub fn group_by_chart(outcomes: &[DiffOutcome]) -> Vec<(String, Vec<&DiffOutcome>)> {
    let mut groups: Vec<(String, Vec<&DiffOutcome>)> = Vec::new();
    for outcome in outcomes {
        match groups.iter_mut().find(|(chart, _)| chart == outcome.chart()) {
            Some((_, members)) => members.push(outcome),
            None => groups.push((outcome.chart().to_string(), vec![outcome])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn target(chart: &str, env: &str) -> DiffTarget {
        DiffTarget::new(chart, env, "main", "feature")
    }

    #[test]
    fn test_changed_requires_a_diff() {
        let err = DiffOutcome::changed(target("app", "prod"), "".to_string(), " \n".to_string());
        assert!(err.is_err());

        let outcome =
            DiffOutcome::changed(target("app", "prod"), "".to_string(), "+a".to_string()).unwrap();
        assert_eq!(outcome.status(), DiffStatus::Changed);
        assert_eq!(
            outcome.summary(),
            "Changes detected in app for environment prod."
        );
        assert_eq!(outcome.preferred_diff(), "+a");
    }

    #[test]
    fn test_failed_never_has_empty_summary() {
        let outcome = DiffOutcome::failed(target("app", "prod"), "");
        assert_eq!(outcome.summary(), "Diff failed for app/prod");
        assert_eq!(outcome.needs_attention(), true);
    }

    #[test]
    fn test_preferred_diff_prefers_semantic() {
        let outcome = DiffOutcome::changed(
            target("app", "prod"),
            "spec.replicas\n  - 1\n  + 2".to_string(),
            "-replicas: 1\n+replicas: 2".to_string(),
        )
        .unwrap();
        assert_eq!(outcome.preferred_diff(), "spec.replicas\n  - 1\n  + 2");
    }

    #[test]
    fn test_diff_label() {
        assert_eq!(diff_label("my-app", "prod", "main"), "my-app/prod (main)");
        assert_eq!(target("my-app", "dev").head_label(), "my-app/dev (feature)");
    }

    #[test]
    fn test_count_and_group() {
        let outcomes = vec![
            DiffOutcome::unchanged(target("b", "dev"), NO_CHANGES_SUMMARY),
            DiffOutcome::changed(target("a", "dev"), "x".to_string(), "".to_string()).unwrap(),
            DiffOutcome::failed(target("b", "prod"), "boom"),
        ];
        assert_eq!(
            count_by_status(&outcomes),
            StatusCounts {
                unchanged: 1,
                changed: 1,
                failed: 1
            }
        );

        let groups = group_by_chart(&outcomes);
        let names: Vec<&str> = groups.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[1].environment(), "prod");
    }
}
