use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use gate_engine::{FolderPattern, DEFAULT_SYNC_INTERVAL};
use gitops::GITHUB_API_URL;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_APP_NAME: &str = "chartgate";
const DEFAULT_CHART_DIR: &str = "charts";
const DEFAULT_MAX_CONCURRENT_RUNS: usize = 5;
const DEFAULT_ARGO_LOCAL_PATH: &str = "/tmp/chartgate-argocd";

/// Settings for the Argo CD application mirror. Present only when `ARGO_APPS_REPO` is set.
#[derive(Debug, Clone)]
pub struct ArgoConfig {
    pub repo_url: String,
    pub local_path: PathBuf,
    pub sync_interval: Duration,
    pub folder_pattern: FolderPattern,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub webhook_secret: String,
    pub github_app_id: String,
    pub github_private_key: String,
    pub github_installation_id: Option<u64>,
    pub github_api_url: String,
    pub app_name: String,
    pub app_url: Option<String>,
    pub chart_dir: String,
    pub max_concurrent_runs: usize,
    pub max_env_concurrency: Option<usize>,
    pub argo: Option<ArgoConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| anyhow!("{} must be set", key));

        let max_concurrent_runs = parse_or(&get, "MAX_CONCURRENT_RUNS", DEFAULT_MAX_CONCURRENT_RUNS)?;
        if max_concurrent_runs == 0 {
            bail!("MAX_CONCURRENT_RUNS must be at least 1");
        }
        let max_env_concurrency = match get("MAX_ENV_CONCURRENCY") {
            Some(value) => {
                let parsed: usize = value
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid MAX_ENV_CONCURRENCY: {}", value))?;
                Some(parsed.max(1))
            }
            None => None,
        };

        let argo = match get("ARGO_APPS_REPO") {
            Some(repo_url) => {
                let sync_interval = match get("ARGO_APPS_SYNC_INTERVAL") {
                    Some(value) => humantime::parse_duration(value.trim())
                        .with_context(|| format!("Invalid ARGO_APPS_SYNC_INTERVAL: {}", value))?,
                    None => DEFAULT_SYNC_INTERVAL,
                };
                let folder_pattern = match get("ARGO_APPS_FOLDER_PATTERN") {
                    Some(value) => FolderPattern::parse(value.trim())
                        .with_context(|| format!("Invalid ARGO_APPS_FOLDER_PATTERN: {}", value))?,
                    None => FolderPattern::default(),
                };
                Some(ArgoConfig {
                    repo_url,
                    local_path: PathBuf::from(
                        get("ARGO_APPS_LOCAL_PATH")
                            .unwrap_or_else(|| DEFAULT_ARGO_LOCAL_PATH.to_string()),
                    ),
                    sync_interval,
                    folder_pattern,
                })
            }
            None => None,
        };

        Ok(ServerConfig {
            port: parse_or(&get, "PORT", DEFAULT_PORT)?,
            webhook_secret: required("WEBHOOK_SECRET")?,
            github_app_id: required("GITHUB_APP_ID")?,
            // Keys passed through single-line env vars often carry literal \n
            github_private_key: required("GITHUB_PRIVATE_KEY")?.replace("\\n", "\n"),
            github_installation_id: get("GITHUB_INSTALLATION_ID")
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .with_context(|| format!("Invalid GITHUB_INSTALLATION_ID: {}", v))
                })
                .transpose()?,
            github_api_url: get("GITHUB_API_URL").unwrap_or_else(|| GITHUB_API_URL.to_string()),
            app_name: get("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            app_url: get("APP_URL"),
            chart_dir: get("CHART_DIR").unwrap_or_else(|| DEFAULT_CHART_DIR.to_string()),
            max_concurrent_runs,
            max_env_concurrency,
            argo,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, anyhow::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {}", key, value)),
        None => Ok(default),
    }
}
