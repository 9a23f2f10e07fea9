use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use gate_engine::GitMirror;
use gitops::{parse_pull_request_event, verify_signature};
use log::{debug, info, warn};

use crate::dispatcher::Dispatcher;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const EVENT_HEADER: &str = "x-github-event";
const DELIVERY_HEADER: &str = "x-github-delivery";

pub struct AppState {
    webhook_secret: String,
    dispatcher: Dispatcher,
    mirror: Option<Arc<GitMirror>>,
}

impl AppState {
    pub fn new(
        webhook_secret: String,
        dispatcher: Dispatcher,
        mirror: Option<Arc<GitMirror>>,
    ) -> Self {
        AppState {
            webhook_secret,
            dispatcher,
            mirror,
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let delivery_id = header(&headers, DELIVERY_HEADER)
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if let Err(e) = verify_signature(
        &body,
        header(&headers, SIGNATURE_HEADER),
        &state.webhook_secret,
    ) {
        warn!("[delivery={}] Rejected webhook: {}", delivery_id, e);
        return (StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let event_type = header(&headers, EVENT_HEADER).unwrap_or_default();
    match parse_pull_request_event(event_type, &body) {
        Ok(Some(pr)) => {
            info!("[delivery={}] Accepted {} event for {}", delivery_id, event_type, pr);
            state.dispatcher.dispatch(pr, delivery_id);
            (StatusCode::ACCEPTED, "accepted")
        }
        Ok(None) => {
            debug!("[delivery={}] Ignored {} event", delivery_id, event_type);
            (StatusCode::OK, "ignored")
        }
        Err(e) => {
            warn!("[delivery={}] Unparseable {} event: {}", delivery_id, event_type, e);
            (StatusCode::BAD_REQUEST, "failed to parse webhook")
        }
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Ready once the mirror has been cloned and indexed, or immediately when there is no mirror.
async fn startup_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.mirror {
        Some(mirror) if !mirror.is_ready() => (StatusCode::SERVICE_UNAVAILABLE, "starting"),
        _ => (StatusCode::OK, "ok"),
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/startup", get(startup_handler))
        .with_state(Arc::new(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use gate_defs::{DiffRunner, PullRequestContext};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    const SECRET: &str = "webhook-secret";

    struct ChannelRunner {
        tx: mpsc::UnboundedSender<(PullRequestContext, Option<String>)>,
    }

    #[async_trait]
    impl DiffRunner for ChannelRunner {
        async fn execute(&self, pr: PullRequestContext) -> Result<(), anyhow::Error> {
            let _ = self.tx.send((pr, gate_utils::current_delivery_id()));
            Ok(())
        }
    }

    fn router(
        mirror: Option<Arc<GitMirror>>,
    ) -> (Router, mpsc::UnboundedReceiver<(PullRequestContext, Option<String>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(Arc::new(ChannelRunner { tx }), 5);
        (
            create_router(AppState::new(SECRET.to_string(), dispatcher, mirror)),
            rx,
        )
    }

    fn payload(action: &str) -> String {
        serde_json::json!({
            "action": action,
            "number": 17,
            "pull_request": {
                "number": 17,
                "head": {"ref": "bump-api", "sha": "f00d"},
                "base": {"ref": "main", "sha": "beef"}
            },
            "repository": {
                "name": "platform",
                "full_name": "acme/platform",
                "owner": {"login": "acme"}
            },
            "installation": {"id": 3}
        })
        .to_string()
    }

    fn webhook_request(event: &str, body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .uri("/webhook")
            .method("POST")
            .header("content-type", "application/json")
            .header("x-github-event", event)
            .header("x-github-delivery", "delivery-42");
        if let Some(signature) = signature {
            builder = builder.header("x-hub-signature-256", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_valid_pull_request_is_accepted_and_dispatched() {
        let (app, mut rx) = router(None);
        let body = payload("opened");
        let signature = gitops::sign(body.as_bytes(), SECRET);

        let response = app
            .oneshot(webhook_request("pull_request", &body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let (pr, delivery_id) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.number, 17);
        assert_eq!(pr.head_ref, "bump-api");
        assert_eq!(pr.installation_id, Some(3));
        assert_eq!(delivery_id, Some("delivery-42".to_string()));
    }

    #[tokio::test]
    async fn test_tampered_body_is_unauthorized() {
        let (app, mut rx) = router(None);
        let body = payload("opened");
        let signature = gitops::sign(body.as_bytes(), SECRET);
        let tampered = body.replace("bump-api", "evil");

        let response = app
            .oneshot(webhook_request("pull_request", &tampered, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized() {
        let (app, _rx) = router(None);
        let response = app
            .oneshot(webhook_request("pull_request", &payload("opened"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_ignored_events_return_ok() {
        for (event, action) in [("push", "opened"), ("pull_request", "closed")] {
            let (app, mut rx) = router(None);
            let body = payload(action);
            let signature = gitops::sign(body.as_bytes(), SECRET);
            let response = app
                .oneshot(webhook_request(event, &body, Some(signature)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_unparseable_body_is_bad_request() {
        let (app, _rx) = router(None);
        let body = r#"{"action": "opened", "number": 1}"#;
        let signature = gitops::sign(body.as_bytes(), SECRET);
        let response = app
            .oneshot(webhook_request("pull_request", body, Some(signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_startup() {
        let (app, _rx) = router(None);
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"ok");

        let response = app
            .oneshot(Request::builder().uri("/startup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_startup_waits_for_mirror() {
        let mirror = Arc::new(GitMirror::new(
            "https://example.invalid/apps.git",
            Path::new("/tmp/chartgate-test-never-cloned"),
            Duration::from_secs(3600),
        ));
        let (app, _rx) = router(Some(mirror));
        let response = app
            .oneshot(Request::builder().uri("/startup").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
