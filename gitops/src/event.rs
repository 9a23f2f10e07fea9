use gate_defs::{PullRequestContext, PullRequestEvent};
use log::debug;
use thiserror::Error;

pub const PULL_REQUEST_EVENT: &str = "pull_request";

const HANDLED_ACTIONS: [&str; 3] = ["opened", "synchronize", "reopened"];

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid webhook payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("webhook payload is missing {0}")]
    MissingField(&'static str),
}

/// Turns a webhook delivery into a pull request context.
///
/// Returns `Ok(None)` for events we do not act on: other event types and pull
/// request actions besides opened, synchronize and reopened.
pub fn parse_pull_request_event(
    event_type: &str,
    body: &[u8],
) -> Result<Option<PullRequestContext>, EventError> {
    if event_type != PULL_REQUEST_EVENT {
        debug!("Ignoring {} event", event_type);
        return Ok(None);
    }

    // Unsupported actions are ignored before the full shape is checked.
    let raw: serde_json::Value = serde_json::from_slice(body)?;
    let action = raw
        .get("action")
        .and_then(|a| a.as_str())
        .ok_or(EventError::MissingField("action"))?;
    if !HANDLED_ACTIONS.contains(&action) {
        debug!("Ignoring pull_request action {}", action);
        return Ok(None);
    }

    let event: PullRequestEvent = serde_json::from_value(raw)?;
    if event.repository.owner.login.is_empty() {
        return Err(EventError::MissingField("repository.owner.login"));
    }
    if event.pull_request.head.sha.is_empty() {
        return Err(EventError::MissingField("pull_request.head.sha"));
    }

    Ok(Some(PullRequestContext {
        owner: event.repository.owner.login,
        repo: event.repository.name,
        number: event.number,
        base_ref: event.pull_request.base.git_ref,
        head_ref: event.pull_request.head.git_ref,
        head_sha: event.pull_request.head.sha,
        installation_id: event.installation.map(|i| i.id),
    }))
}
