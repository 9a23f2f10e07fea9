use std::sync::Arc;

use gate_defs::{DiffRunner, PullRequestContext};
use log::{error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Runs accepted pull request events in the background, at most `max_concurrent` at a time.
#[derive(Clone)]
pub struct Dispatcher {
    runner: Arc<dyn DiffRunner>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(runner: Arc<dyn DiffRunner>, max_concurrent: usize) -> Self {
        Dispatcher {
            runner,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawns the run and returns immediately; the permit is awaited inside the task.
    /// Dropping the returned handle does not cancel the run.
    pub fn dispatch(&self, pr: PullRequestContext, delivery_id: String) -> JoinHandle<()> {
        let runner = Arc::clone(&self.runner);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(gate_utils::with_delivery_id(delivery_id, async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Dispatcher closed, dropping run for {}", pr);
                    return;
                }
            };
            info!("Starting diff for {} at {}", pr, pr.head_sha);
            match runner.execute(pr.clone()).await {
                Ok(()) => info!("Finished diff for {}", pr),
                Err(e) => error!("Diff for {} failed: {:#}", pr, e),
            }
        }))
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}
