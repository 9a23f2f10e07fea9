use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use gate_defs::RefreshHook;
use log::{error, info, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::cmd::run_checked;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// A shallow local clone of a remote repository, refreshed on a timer.
///
/// Hooks registered with [`GitMirror::on_sync`] run after every successful refresh, in
/// registration order. A failed refresh skips them, so consumers keep their previous state.
pub struct GitMirror {
    repo_url: String,
    path: PathBuf,
    interval: Duration,
    hooks: Mutex<Vec<Arc<dyn RefreshHook>>>,
    ready: AtomicBool,
    shutdown: AtomicBool,
    wake: Notify,
}

impl GitMirror {
    pub fn new(repo_url: &str, path: &Path, interval: Duration) -> Self {
        GitMirror {
            repo_url: repo_url.to_string(),
            path: path.to_path_buf(),
            interval,
            hooks: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn on_sync(&self, hook: Arc<dyn RefreshHook>) {
        self.hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(hook);
    }

    /// True once the first refresh and its hooks have completed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn is_cloned(&self) -> bool {
        self.path.join(".git").exists()
    }

    async fn git(&self, args: &[&str]) -> Result<(), anyhow::Error> {
        let mut exec = tokio::process::Command::new("git");
        exec.args(args).env("GIT_TERMINAL_PROMPT", "0");
        run_checked(&mut exec).await?;
        Ok(())
    }

    async fn fetch_latest(&self) -> Result<(), anyhow::Error> {
        if self.is_cloned() {
            let path = self.path.to_string_lossy().to_string();
            self.git(&["-C", &path, "pull", "--ff-only"])
                .await
                .context("git pull failed")
        } else {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!("Cloning {} into {}", self.repo_url, self.path.display());
            let path = self.path.to_string_lossy().to_string();
            self.git(&["clone", "--depth=1", &self.repo_url, &path])
                .await
                .context("git clone failed")
        }
    }

    /// Clones or pulls, then runs every hook. Hook failures are logged, not returned.
    pub async fn sync(&self) -> Result<(), anyhow::Error> {
        self.fetch_latest().await?;

        let hooks: Vec<Arc<dyn RefreshHook>> = self
            .hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for hook in hooks {
            if let Err(e) = hook.on_refresh(&self.path).await {
                error!("Sync hook failed for {}: {:#}", self.path.display(), e);
            }
        }

        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Runs an initial sync, then keeps syncing every interval until [`GitMirror::stop`].
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mirror = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = mirror.sync().await {
                error!("Initial sync of {} failed: {:#}", mirror.repo_url, e);
            }

            let mut interval_timer = tokio::time::interval(mirror.interval);
            interval_timer.tick().await; // skip immediate first tick

            loop {
                if mirror.shutdown.load(Ordering::Acquire) {
                    break;
                }
                tokio::select! {
                    _ = interval_timer.tick() => {},
                    _ = mirror.wake.notified() => {},
                }
                if mirror.shutdown.load(Ordering::Acquire) {
                    break;
                }

                info!("Syncing {}", mirror.repo_url);
                if let Err(e) = mirror.sync().await {
                    warn!(
                        "Sync of {} failed, keeping previous state: {:#}",
                        mirror.repo_url, e
                    );
                }
            }
            info!("Stopped sync loop for {}", mirror.repo_url);
        })
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    struct CountingHook {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RefreshHook for CountingHook {
        async fn on_refresh(&self, _root: &Path) -> Result<(), anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok()
    }

    fn init_origin(dir: &Path) {
        let run = |args: &[&str]| {
            let status = std::process::Command::new("git")
                .args(args)
                .current_dir(dir)
                .env("GIT_AUTHOR_NAME", "test")
                .env("GIT_AUTHOR_EMAIL", "test@example.com")
                .env("GIT_COMMITTER_NAME", "test")
                .env("GIT_COMMITTER_EMAIL", "test@example.com")
                .status()
                .unwrap();
            assert!(status.success(), "git {:?} failed", args);
        };
        run(&["init", "-q"]);
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "init"]);
    }

    #[tokio::test]
    async fn test_failed_sync_skips_hooks() {
        let tmp = tempfile::tempdir().unwrap();
        let mirror = GitMirror::new(
            "file:///definitely/not/a/repo",
            &tmp.path().join("mirror"),
            DEFAULT_SYNC_INTERVAL,
        );
        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
        });
        mirror.on_sync(hook.clone());

        assert!(mirror.sync().await.is_err());
        assert_eq!(hook.calls.load(Ordering::SeqCst), 0);
        assert_eq!(mirror.is_ready(), false);
    }

    #[tokio::test]
    async fn test_sync_clones_then_pulls() {
        if !git_available() {
            return;
        }
        let origin = tempfile::tempdir().unwrap();
        init_origin(origin.path());
        let work = tempfile::tempdir().unwrap();
        let url = format!("file://{}", origin.path().display());
        let mirror = GitMirror::new(&url, &work.path().join("mirror"), DEFAULT_SYNC_INTERVAL);
        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
        });
        mirror.on_sync(hook.clone());

        mirror.sync().await.unwrap();
        assert!(mirror.path().join("README.md").exists());
        assert_eq!(mirror.is_ready(), true);

        mirror.sync().await.unwrap();
        assert_eq!(hook.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let mirror = Arc::new(GitMirror::new(
            "file:///definitely/not/a/repo",
            &tmp.path().join("mirror"),
            Duration::from_secs(3600),
        ));
        let handle = mirror.start();
        mirror.stop();
        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("sync loop did not stop")
            .unwrap();
    }
}
