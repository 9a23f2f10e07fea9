mod folder_pattern;
mod manifest;

pub use folder_pattern::{FolderPattern, FolderPatternError, DEFAULT_FOLDER_PATTERN};
pub use manifest::{parse_applications, ApplicationSummary, ManifestError};

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::Context;
use async_trait::async_trait;
use gate_defs::{IndexEntry, IndexSnapshot, RefreshHook};
use log::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexState {
    /// No scan running. Either nothing was built yet or the last scan failed.
    Idle,
    Scanning,
    /// The last scan completed and its result is being served.
    Swapped,
}

/// Chart name to environment entries, built from Argo CD Application manifests in a
/// mirrored repository. Rebuilt wholesale and swapped in atomically, so readers see
/// either the previous or the new index, never a mix.
pub struct ConfigIndex {
    pattern: FolderPattern,
    entries: RwLock<Arc<IndexSnapshot>>,
    state: Mutex<IndexState>,
    generation: AtomicU64,
}

impl ConfigIndex {
    pub fn new(pattern: FolderPattern) -> Self {
        ConfigIndex {
            pattern,
            entries: RwLock::new(Arc::new(IndexSnapshot::new())),
            state: Mutex::new(IndexState::Idle),
            generation: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, chart_name: &str) -> Vec<IndexEntry> {
        self.snapshot()
            .get(chart_name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        let guard = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn state(&self) -> IndexState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of successful swaps so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn set_state(&self, state: IndexState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn swap(&self, snapshot: IndexSnapshot) {
        let snapshot = Arc::new(snapshot);
        {
            let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
            *guard = snapshot;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.set_state(IndexState::Swapped);
    }

    /// Scans `root` and swaps in the result. Returns the number of indexed entries.
    pub fn rebuild(&self, root: &Path) -> Result<usize, anyhow::Error> {
        self.set_state(IndexState::Scanning);
        self.apply(build_snapshot(root, &self.pattern))
    }

    /// Swaps in a finished scan, or keeps the current index when the scan failed.
    fn apply(&self, scanned: Result<IndexSnapshot, anyhow::Error>) -> Result<usize, anyhow::Error> {
        match scanned {
            Ok(snapshot) => {
                let count = snapshot.values().map(|v| v.len()).sum();
                info!(
                    "Index rebuilt: {} applications across {} charts",
                    count,
                    snapshot.len()
                );
                self.swap(snapshot);
                Ok(count)
            }
            Err(e) => {
                error!("Failed to rebuild index, keeping previous one: {:#}", e);
                self.set_state(IndexState::Idle);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl RefreshHook for ConfigIndex {
    async fn on_refresh(&self, root: &Path) -> Result<(), anyhow::Error> {
        self.set_state(IndexState::Scanning);
        let root = root.to_path_buf();
        let pattern = self.pattern.clone();
        let scanned = tokio::task::spawn_blocking(move || build_snapshot(&root, &pattern))
            .await
            .context("Index scan task panicked")
            .and_then(|r| r);
        self.apply(scanned).map(|_| ())
    }
}

/// Walks `root` and builds a fresh snapshot. Files that fail to parse are skipped.
pub fn build_snapshot(root: &Path, pattern: &FolderPattern) -> Result<IndexSnapshot, anyhow::Error> {
    let files = gate_utils::find_yaml_files(root)
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    let mut snapshot = IndexSnapshot::new();
    for file in files {
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", file.display(), e);
                continue;
            }
        };

        for result in parse_applications(&content) {
            let app = match result {
                Ok(app) => app,
                Err(ManifestError::NotAnApplication(_)) => continue,
                Err(e) => {
                    warn!(
                        "Failed to parse {} as an Argo CD Application: {}",
                        file.display(),
                        e
                    );
                    continue;
                }
            };

            let relative = file.strip_prefix(root).unwrap_or(&file);
            let dir = relative.parent().unwrap_or_else(|| Path::new(""));
            let (chart_name, environment) = match pattern.extract(dir) {
                Ok(names) => names,
                Err(e) => {
                    warn!("Skipping {}: {}", file.display(), e);
                    continue;
                }
            };

            debug!(
                "Indexed {} for chart {} in environment {}",
                relative.display(),
                chart_name,
                environment
            );
            snapshot
                .entry(chart_name.clone())
                .or_default()
                .push(IndexEntry {
                    chart_name,
                    chart_path: app.chart_identifier,
                    environment,
                    value_files: app.value_files,
                    repo_url: app.repo_url,
                });
        }
    }
    Ok(snapshot)
}
