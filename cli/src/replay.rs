use anyhow::{anyhow, Context};
use gate_defs::{GitRef, Installation, Owner, PullRequest, PullRequestEvent, Repository};
use gitops::PULL_REQUEST_EVENT;
use log::debug;
use regex::Regex;

/// Owner, repository and number of a pull request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

pub fn parse_pr_url(url: &str) -> Result<PullRequestRef, anyhow::Error> {
    let re = Regex::new(r"github\.com/([^/]+)/([^/]+)/pull/(\d+)(?:/.*)?$")?;
    let caps = re
        .captures(url.trim())
        .ok_or_else(|| anyhow!("Not a pull request URL: {}", url))?;
    Ok(PullRequestRef {
        owner: caps[1].to_string(),
        repo: caps[2].to_string(),
        number: caps[3]
            .parse()
            .with_context(|| format!("Invalid pull request number in {}", url))?,
    })
}

/// A `synchronize` event for `pr`, shaped like the ones GitHub delivers.
pub fn build_payload(
    target: &PullRequestRef,
    pr: &PullRequest,
    installation_id: Option<u64>,
) -> PullRequestEvent {
    PullRequestEvent {
        action: "synchronize".to_string(),
        number: target.number,
        pull_request: PullRequest {
            number: target.number,
            head: GitRef {
                git_ref: pr.head.git_ref.clone(),
                sha: pr.head.sha.clone(),
            },
            base: GitRef {
                git_ref: pr.base.git_ref.clone(),
                sha: pr.base.sha.clone(),
            },
        },
        repository: Repository {
            owner: Owner {
                login: target.owner.clone(),
            },
            name: target.repo.clone(),
            full_name: format!("{}/{}", target.owner, target.repo),
        },
        installation: installation_id.map(|id| Installation { id }),
    }
}

/// Signs and posts `payload` to the webhook endpoint. Returns the response status.
pub async fn send_webhook(
    webhook_url: &str,
    secret: &str,
    payload: &PullRequestEvent,
) -> Result<reqwest::StatusCode, anyhow::Error> {
    let body = serde_json::to_vec(payload)?;
    let delivery_id = uuid::Uuid::new_v4().to_string();
    debug!("Sending delivery {} to {}", delivery_id, webhook_url);

    let response = reqwest::Client::new()
        .post(webhook_url)
        .header("Content-Type", "application/json")
        .header("X-GitHub-Event", PULL_REQUEST_EVENT)
        .header("X-GitHub-Delivery", &delivery_id)
        .header("X-Hub-Signature-256", gitops::sign(&body, secret))
        .body(body)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", webhook_url))?;
    Ok(response.status())
}

pub fn is_success(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::OK || status == reqwest::StatusCode::ACCEPTED
}
