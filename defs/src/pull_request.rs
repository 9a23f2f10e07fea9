use serde::{Deserialize, Serialize};

/// Everything a run needs to know about the pull request that triggered it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PullRequestContext {
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub base_ref: String,
    pub head_ref: String,
    pub head_sha: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<u64>,
}

impl PullRequestContext {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

impl std::fmt::Display for PullRequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChangedChart {
    /// Name from the chart's `Chart.yaml`.
    pub name: String,
    /// Repository-relative directory, e.g. `charts/my-app`.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pull_request_display() {
        let pr = PullRequestContext {
            owner: "acme".to_string(),
            repo: "platform".to_string(),
            number: 42,
            base_ref: "main".to_string(),
            head_ref: "feature/x".to_string(),
            head_sha: "abc123".to_string(),
            installation_id: None,
        };
        assert_eq!(pr.to_string(), "acme/platform#42");
        assert_eq!(pr.full_name(), "acme/platform");
    }
}
