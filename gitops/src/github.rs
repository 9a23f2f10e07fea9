use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine;
use gate_defs::{
    ChangeDetector, ChangedChart, ChartCheckout, ChartSource, CheckRun, CheckRunCreated,
    CheckRunOutput, CheckRunUpdate, DiffOutcome, FetchError, IssueComment, PullRequest,
    PullRequestContext, PullRequestFile, Reporter,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use log::{debug, info, warn};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::report::{
    check_run_output, comment_marker, conclusion, format_comment, CHECK_TITLE,
    IN_PROGRESS_SUMMARY,
};

const CHARTGATE_USER_AGENT: &str = "chartgate/gitops";
pub const GITHUB_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;
// Installation tokens live for an hour; refresh a little early.
const TOKEN_TTL: Duration = Duration::from_secs(55 * 60);

/// How the client authenticates against the REST API.
#[derive(Clone)]
pub enum GitHubAuth {
    /// GitHub App credentials, exchanged for per-installation tokens.
    App {
        app_id: String,
        private_key_pem: String,
        default_installation_id: Option<u64>,
    },
    /// A fixed personal or installation token.
    Token(String),
}

impl std::fmt::Debug for GitHubAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitHubAuth::App { app_id, .. } => write!(f, "App({})", app_id),
            GitHubAuth::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// Claims for the GitHub App JWT.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iat: usize,
    exp: usize,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct InstallationResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct FileContent {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct ChartMetadata {
    #[serde(default)]
    name: String,
}

struct CachedToken {
    token: String,
    fetched_at: Instant,
}

/// REST client for everything the gate needs from GitHub: changed files, chart
/// archives, check runs and PR comments.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    auth: GitHubAuth,
    app_name: String,
    app_url: Option<String>,
    chart_dir: String,
    tokens: Mutex<HashMap<u64, CachedToken>>,
    installations: Mutex<HashMap<String, u64>>,
}

impl GitHubClient {
    pub fn new(auth: GitHubAuth, app_name: &str) -> Self {
        GitHubClient {
            http: reqwest::Client::new(),
            api_url: GITHUB_API_URL.to_string(),
            auth,
            app_name: app_name.to_string(),
            app_url: None,
            chart_dir: "charts".to_string(),
            tokens: Mutex::new(HashMap::new()),
            installations: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_app_url(mut self, app_url: Option<String>) -> Self {
        self.app_url = app_url.filter(|u| !u.is_empty());
        self
    }

    pub fn with_chart_dir(mut self, chart_dir: &str) -> Self {
        self.chart_dir = chart_dir.trim_matches('/').to_string();
        self
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .header("User-Agent", CHARTGATE_USER_AGENT)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("token {}", token))
    }

    fn app_jwt(app_id: &str, private_key_pem: &str) -> Result<String, anyhow::Error> {
        // Valid for 10 minutes, backdated 60 seconds for clock skew
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let claims = Claims {
            iat: (now - 60) as usize,
            exp: (now + 10 * 60) as usize,
            iss: app_id.to_owned(),
        };
        let header = Header::new(jsonwebtoken::Algorithm::RS256);
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .context("Invalid GitHub App private key")?;
        Ok(encode(&header, &claims, &key)?)
    }

    async fn installation_token(
        &self,
        installation_id: u64,
        app_id: &str,
        private_key_pem: &str,
    ) -> Result<String, anyhow::Error> {
        let cached = {
            let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
            tokens
                .get(&installation_id)
                .filter(|c| c.fetched_at.elapsed() < TOKEN_TTL)
                .map(|c| c.token.clone())
        };
        if let Some(token) = cached {
            return Ok(token);
        }

        let jwt = Self::app_jwt(app_id, private_key_pem)?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation_id
        );
        let response: InstallationTokenResponse = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", CHARTGATE_USER_AGENT)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Failed to get token for installation {}", installation_id))?
            .json()
            .await?;

        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).insert(
            installation_id,
            CachedToken {
                token: response.token.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(response.token)
    }

    async fn lookup_installation(
        &self,
        owner: &str,
        repo: &str,
        app_id: &str,
        private_key_pem: &str,
    ) -> Result<u64, anyhow::Error> {
        let jwt = Self::app_jwt(app_id, private_key_pem)?;
        let url = format!("{}/repos/{}/{}/installation", self.api_url, owner, repo);
        let response: InstallationResponse = self
            .http
            .get(&url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", CHARTGATE_USER_AGENT)
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("App is not installed on {}/{}", owner, repo))?
            .json()
            .await?;
        Ok(response.id)
    }

    /// Token for calls against `owner/repo`. The installation id from a webhook
    /// payload takes precedence and is remembered for later calls on the same repository.
    async fn token_for_repo(
        &self,
        owner: &str,
        repo: &str,
        installation_hint: Option<u64>,
    ) -> Result<String, anyhow::Error> {
        let (app_id, private_key_pem, default_installation_id) = match &self.auth {
            GitHubAuth::Token(token) => return Ok(token.clone()),
            GitHubAuth::App {
                app_id,
                private_key_pem,
                default_installation_id,
            } => (app_id, private_key_pem, *default_installation_id),
        };

        let full_name = format!("{}/{}", owner, repo);
        let known = {
            let mut installations = self.installations.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(id) = installation_hint {
                installations.insert(full_name.clone(), id);
            }
            installations.get(&full_name).copied()
        };

        let installation_id = match known.or(default_installation_id) {
            Some(id) => id,
            None => {
                let id = self
                    .lookup_installation(owner, repo, app_id, private_key_pem)
                    .await?;
                self.installations
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(full_name, id);
                id
            }
        };
        self.installation_token(installation_id, app_id, private_key_pem)
            .await
    }

    async fn pr_token(&self, pr: &PullRequestContext) -> Result<String, anyhow::Error> {
        self.token_for_repo(&pr.owner, &pr.repo, pr.installation_id)
            .await
    }

    pub async fn get_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, anyhow::Error> {
        let token = self.token_for_repo(owner, repo, None).await?;
        let pr = self
            .request(
                Method::GET,
                &format!("/repos/{}/{}/pulls/{}", owner, repo, number),
                &token,
            )
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Failed to fetch pull request {}/{}#{}", owner, repo, number))?
            .json()
            .await?;
        Ok(pr)
    }

    async fn list_changed_files(
        &self,
        pr: &PullRequestContext,
        token: &str,
    ) -> Result<Vec<String>, anyhow::Error> {
        let path = format!("/repos/{}/{}/pulls/{}/files", pr.owner, pr.repo, pr.number);
        let mut files = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<PullRequestFile> = self
                .request(Method::GET, &path, token)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?
                .error_for_status()
                .context("Failed to list pull request files")?
                .json()
                .await?;
            let done = batch.len() < PER_PAGE;
            files.extend(batch.into_iter().map(|f| f.filename));
            if done {
                break;
            }
            page += 1;
        }
        Ok(files)
    }

    /// Returns `Ok(None)` when the file does not exist at `git_ref`.
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
        token: &str,
    ) -> Result<Option<String>, anyhow::Error> {
        let response = self
            .request(
                Method::GET,
                &format!("/repos/{}/{}/contents/{}", owner, repo, path),
                token,
            )
            .query(&[("ref", git_ref)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let file: FileContent = response.error_for_status()?.json().await?;
        if file.encoding != "base64" {
            return Err(anyhow!("Unexpected encoding {} for {}", file.encoding, path));
        }
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(file.content.replace('\n', ""))
            .with_context(|| format!("Invalid base64 content for {}", path))?;
        Ok(Some(String::from_utf8(decoded)?))
    }

    async fn download_tarball(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, anyhow::Error> {
        let token = self.token_for_repo(owner, repo, None).await?;
        let bytes = self
            .request(
                Method::GET,
                &format!("/repos/{}/{}/tarball/{}", owner, repo, git_ref),
                &token,
            )
            .send()
            .await?
            .error_for_status()
            .with_context(|| format!("Failed to download {}/{} at {}", owner, repo, git_ref))?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn list_comments(
        &self,
        pr: &PullRequestContext,
        token: &str,
    ) -> Result<Vec<IssueComment>, anyhow::Error> {
        let path = format!("/repos/{}/{}/issues/{}/comments", pr.owner, pr.repo, pr.number);
        let mut comments = Vec::new();
        let mut page = 1;
        loop {
            let batch: Vec<IssueComment> = self
                .request(Method::GET, &path, token)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?
                .error_for_status()
                .context("Failed to list pull request comments")?
                .json()
                .await?;
            let done = batch.len() < PER_PAGE;
            comments.extend(batch);
            if done {
                break;
            }
            page += 1;
        }
        Ok(comments)
    }

    async fn delete_matching_comments(&self, pr: &PullRequestContext, marker: &str, token: &str) {
        let comments = match self.list_comments(pr, token).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!("{}: could not list comments: {:#}", pr, e);
                return;
            }
        };
        for comment in comments {
            if !comment.body.as_deref().unwrap_or_default().contains(marker) {
                continue;
            }
            let path = format!(
                "/repos/{}/{}/issues/comments/{}",
                pr.owner, pr.repo, comment.id
            );
            match self
                .request(Method::DELETE, &path, token)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(_) => debug!("{}: deleted old comment {}", pr, comment.id),
                Err(e) => warn!("{}: could not delete comment {}: {}", pr, comment.id, e),
            }
        }
    }
}

/// Distinct chart directories (`{chart_dir}/{name}`) touched by `files`, in
/// first-seen order. Files directly under `chart_dir` do not count.
pub fn chart_dirs_from_files(chart_dir: &str, files: &[String]) -> Vec<String> {
    let prefix = format!("{}/", chart_dir.trim_matches('/'));
    let mut dirs: Vec<String> = Vec::new();
    for file in files {
        let rest = match file.strip_prefix(&prefix) {
            Some(rest) => rest,
            None => continue,
        };
        let name = match rest.split_once('/') {
            Some((name, _)) if !name.is_empty() => name,
            _ => continue,
        };
        let dir = format!("{}{}", prefix, name);
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

pub fn parse_chart_name(chart_yaml: &str) -> Result<String, anyhow::Error> {
    let metadata: ChartMetadata =
        serde_yaml::from_str(chart_yaml).context("Failed to parse Chart.yaml")?;
    if metadata.name.trim().is_empty() {
        return Err(anyhow!("Chart.yaml has no name"));
    }
    Ok(metadata.name)
}

#[async_trait]
impl ChangeDetector for GitHubClient {
    async fn changed_charts(
        &self,
        pr: &PullRequestContext,
    ) -> Result<Vec<ChangedChart>, anyhow::Error> {
        let token = self.pr_token(pr).await?;
        let files = self.list_changed_files(pr, &token).await?;
        debug!("{}: {} changed file(s)", pr, files.len());

        let mut charts = Vec::new();
        for dir in chart_dirs_from_files(&self.chart_dir, &files) {
            let chart_yaml = format!("{}/Chart.yaml", dir);
            let content = match self
                .get_file_content(&pr.owner, &pr.repo, &chart_yaml, &pr.head_ref, &token)
                .await
            {
                Ok(Some(content)) => content,
                Ok(None) => {
                    warn!("{}: {} not found at {}, skipping", pr, chart_yaml, pr.head_ref);
                    continue;
                }
                Err(e) => {
                    warn!("{}: failed to fetch {}: {:#}", pr, chart_yaml, e);
                    continue;
                }
            };
            match parse_chart_name(&content) {
                Ok(name) => charts.push(ChangedChart { name, path: dir }),
                Err(e) => warn!("{}: skipping {}: {:#}", pr, chart_yaml, e),
            }
        }
        Ok(charts)
    }
}

#[async_trait]
impl ChartSource for GitHubClient {
    async fn fetch_chart(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<ChartCheckout, FetchError> {
        let archive = self.download_tarball(owner, repo, git_ref).await?;
        let tmp = tempfile::Builder::new()
            .prefix("chartgate-")
            .tempdir()
            .context("Failed to create temporary directory")?;

        let dest = tmp.path().to_path_buf();
        let root = tokio::task::spawn_blocking(move || {
            gate_utils::extract_targz(&archive, &dest)?;
            gate_utils::single_top_level_dir(&dest)
        })
        .await
        .map_err(|e| anyhow!("Archive extraction panicked: {}", e))??;

        let chart_dir = root.join(path.trim_matches('/'));
        if !chart_dir.is_dir() {
            return Err(FetchError::NotFound {
                path: path.to_string(),
                git_ref: git_ref.to_string(),
            });
        }
        debug!("Fetched {}/{} {} at {}", owner, repo, path, git_ref);
        Ok(ChartCheckout::new(chart_dir, move || drop(tmp)))
    }
}

#[async_trait]
impl Reporter for GitHubClient {
    async fn create_in_progress_check(
        &self,
        pr: &PullRequestContext,
    ) -> Result<u64, anyhow::Error> {
        let token = self.pr_token(pr).await?;
        let check_run = CheckRun {
            head_sha: pr.head_sha.clone(),
            status: "in_progress".to_string(),
            name: self.app_name.clone(),
            conclusion: None,
            started_at: Some(gate_utils::get_timestamp()),
            completed_at: None,
            details_url: self.app_url.clone(),
            output: Some(CheckRunOutput {
                title: CHECK_TITLE.to_string(),
                summary: IN_PROGRESS_SUMMARY.to_string(),
                text: None,
            }),
        };
        let created: CheckRunCreated = self
            .request(
                Method::POST,
                &format!("/repos/{}/{}/check-runs", pr.owner, pr.repo),
                &token,
            )
            .json(&check_run)
            .send()
            .await?
            .error_for_status()
            .context("Failed to create check run")?
            .json()
            .await?;
        info!("{}: created check run {}", pr, created.id);
        Ok(created.id)
    }

    async fn update_check_with_results(
        &self,
        pr: &PullRequestContext,
        check_id: u64,
        outcomes: &[DiffOutcome],
    ) -> Result<(), anyhow::Error> {
        let token = self.pr_token(pr).await?;
        let update = CheckRunUpdate {
            status: "completed".to_string(),
            conclusion: Some(conclusion(outcomes).to_string()),
            completed_at: Some(gate_utils::get_timestamp()),
            output: Some(check_run_output(outcomes)),
        };
        self.request(
            Method::PATCH,
            &format!("/repos/{}/{}/check-runs/{}", pr.owner, pr.repo, check_id),
            &token,
        )
        .json(&update)
        .send()
        .await?
        .error_for_status()
        .context("Failed to update check run")?;
        info!(
            "{}: completed check run {} with {}",
            pr,
            check_id,
            conclusion(outcomes)
        );
        Ok(())
    }

    async fn post_comment(
        &self,
        pr: &PullRequestContext,
        outcomes: &[DiffOutcome],
    ) -> Result<(), anyhow::Error> {
        let chart = match outcomes.first() {
            Some(outcome) => outcome.chart().to_string(),
            None => return Ok(()),
        };
        let token = self.pr_token(pr).await?;
        let marker = comment_marker(&self.app_name, &chart);
        self.delete_matching_comments(pr, &marker, &token).await;

        let body = format_comment(&self.app_name, self.app_url.as_deref(), outcomes);
        self.request(
            Method::POST,
            &format!("/repos/{}/{}/issues/{}/comments", pr.owner, pr.repo, pr.number),
            &token,
        )
        .json(&json!({ "body": body }))
        .send()
        .await?
        .error_for_status()
        .with_context(|| format!("Failed to post comment for {}", chart))?;
        info!("{}: posted comment for {}", pr, chart);
        Ok(())
    }
}
