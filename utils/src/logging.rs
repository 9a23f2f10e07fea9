use std::env;
use std::future::Future;

use chrono::Local;
use log::LevelFilter;

tokio::task_local! {
    static DELIVERY_ID: String;
}

/// Runs `fut` with `delivery_id` attached to every log line it emits.
pub async fn with_delivery_id<F: Future>(delivery_id: String, fut: F) -> F::Output {
    DELIVERY_ID.scope(delivery_id, fut).await
}

pub fn current_delivery_id() -> Option<String> {
    DELIVERY_ID.try_with(|id| id.clone()).ok()
}

/// Wraps a future that is about to be spawned so it keeps the caller's delivery id.
pub fn inherit_delivery_id<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    let delivery_id = current_delivery_id();
    async move {
        match delivery_id {
            Some(id) => DELIVERY_ID.scope(id, fut).await,
            None => fut.await,
        }
    }
}

fn delivery_prefix() -> String {
    current_delivery_id()
        .map(|id| format!("[delivery={}] ", id))
        .unwrap_or_default()
}

pub fn log_level_from_env() -> LevelFilter {
    parse_log_level(env::var("LOG_LEVEL").ok().as_deref())
}

fn parse_log_level(value: Option<&str>) -> LevelFilter {
    match value {
        Some("debug") => LevelFilter::Debug,
        Some("warn") => LevelFilter::Warn,
        Some("error") => LevelFilter::Error,
        _ => LevelFilter::Info, // Default to Info if variable is unset or has an unrecognized value
    }
}

pub fn setup_logging() -> Result<(), fern::InitError> {
    let base_config = fern::Dispatch::new();

    let stderr_config = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}: {}{}",
                Local::now().format("[%Y-%m-%d][%H:%M:%S]"),
                record.target(),
                record.level(),
                delivery_prefix(),
                message
            ))
        })
        .level(log_level_from_env())
        // Quieten the http stack
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stderr());

    base_config.chain(stderr_config).apply()?;

    Ok(())
}
