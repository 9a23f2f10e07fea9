use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Installation {
    pub id: u64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    pub owner: Owner,
    pub name: String,
    pub full_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub login: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PullRequest {
    pub number: u64,
    pub head: GitRef,
    pub base: GitRef,
}

/// Body of a `pull_request` webhook delivery, reduced to the fields we use.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: u64,
    pub pull_request: PullRequest,
    pub repository: Repository,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation: Option<Installation>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckRun {
    pub head_sha: String,
    pub status: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
}

/// PATCH body for an existing check run.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CheckRunUpdate {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<CheckRunOutput>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CheckRunOutput {
    pub title: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CheckRunCreated {
    pub id: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PullRequestFile {
    pub filename: String,
    #[serde(default)]
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_deserialize_pull_request_event() {
        let body = r#"{
            "action": "synchronize",
            "number": 7,
            "pull_request": {
                "number": 7,
                "title": "Bump image",
                "head": {"ref": "bump", "sha": "def456", "label": "acme:bump"},
                "base": {"ref": "main", "sha": "abc123"}
            },
            "repository": {
                "name": "platform",
                "full_name": "acme/platform",
                "owner": {"login": "acme", "id": 1}
            },
            "installation": {"id": 99, "node_id": "I_x"}
        }"#;
        let event: PullRequestEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.action, "synchronize");
        assert_eq!(event.pull_request.head.git_ref, "bump");
        assert_eq!(event.pull_request.base.sha, "abc123");
        assert_eq!(event.installation, Some(Installation { id: 99 }));
    }

    #[test]
    fn test_check_run_skips_empty_fields() {
        let check_run = CheckRun {
            head_sha: "abc".to_string(),
            status: "in_progress".to_string(),
            name: "chartgate".to_string(),
            conclusion: None,
            started_at: None,
            completed_at: None,
            details_url: None,
            output: None,
        };
        let value = serde_json::to_value(&check_run).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"head_sha": "abc", "status": "in_progress", "name": "chartgate"})
        );
    }
}
