use std::sync::Arc;

use anyhow::Context;
use gate_defs::ConfigSource;
use gate_engine::{
    ChartConfigResolver, ConfigIndex, DiffOrchestrator, DirectoryConventionSource, DyffDiffer,
    EnvironmentDiffer, GitMirror, HelmRenderer, IndexSource, LineDiffer,
};
use gate_utils::setup_logging;
use gitops::{GitHubAuth, GitHubClient};
use log::info;

mod config;
mod dispatcher;
mod webhook;

use config::ServerConfig;
use dispatcher::Dispatcher;
use webhook::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    setup_logging().context("Failed to initialize logging")?;

    let config = ServerConfig::from_env()?;

    let github = Arc::new(
        GitHubClient::new(
            GitHubAuth::App {
                app_id: config.github_app_id.clone(),
                private_key_pem: config.github_private_key.clone(),
                default_installation_id: config.github_installation_id,
            },
            &config.app_name,
        )
        .with_api_url(&config.github_api_url)
        .with_app_url(config.app_url.clone())
        .with_chart_dir(&config.chart_dir),
    );

    let mut sources: Vec<Arc<dyn ConfigSource>> = Vec::new();
    let mirror = match &config.argo {
        Some(argo) => {
            let index = Arc::new(ConfigIndex::new(argo.folder_pattern.clone()));
            let mirror = Arc::new(GitMirror::new(
                &argo.repo_url,
                &argo.local_path,
                argo.sync_interval,
            ));
            mirror.on_sync(index.clone());
            sources.push(Arc::new(IndexSource::new(index)));
            info!(
                "Indexing Argo CD applications from {} every {}",
                argo.repo_url,
                humantime::format_duration(argo.sync_interval)
            );
            Some(mirror)
        }
        None => {
            info!("ARGO_APPS_REPO not set, using directory discovery only");
            None
        }
    };
    sources.push(Arc::new(DirectoryConventionSource::new()));

    let differ = EnvironmentDiffer::new(
        Arc::new(HelmRenderer::default()),
        Arc::new(DyffDiffer::default()),
        Arc::new(LineDiffer),
    )
    .with_max_concurrency(config.max_env_concurrency);
    let orchestrator = DiffOrchestrator::new(
        github.clone(),
        github.clone(),
        Arc::new(ChartConfigResolver::new(sources)),
        Arc::new(differ),
        github,
    );
    let dispatcher = Dispatcher::new(Arc::new(orchestrator), config.max_concurrent_runs);

    let sync_task = mirror.as_ref().map(|m| m.start());

    let app = create_router(AppState::new(
        config.webhook_secret.clone(),
        dispatcher,
        mirror.clone(),
    ));
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(
        "{} listening on {} (max {} concurrent runs)",
        config.app_name, addr, config.max_concurrent_runs
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    if let Some(mirror) = &mirror {
        mirror.stop();
    }
    if let Some(task) = sync_task {
        let _ = task.await;
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
