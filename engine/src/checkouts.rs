use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gate_defs::{ChartCheckout, ChartSource, FetchError};
use log::debug;

type CheckoutKey = (String, String, String, String);

/// Remembers the trees fetched while one chart is processed, so the config
/// sources and the differ share a single download per ref.
///
/// Handed-out checkouts keep the underlying tree alive. It is cleaned up once the
/// memo and every handle are dropped.
pub struct CheckoutMemo {
    source: Arc<dyn ChartSource>,
    fetched: Mutex<HashMap<CheckoutKey, Arc<ChartCheckout>>>,
}

impl CheckoutMemo {
    pub fn new(source: Arc<dyn ChartSource>) -> Self {
        CheckoutMemo {
            source,
            fetched: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, key: &CheckoutKey) -> Option<Arc<ChartCheckout>> {
        let fetched = self.fetched.lock().unwrap_or_else(|e| e.into_inner());
        fetched.get(key).cloned()
    }

    fn remember(&self, key: CheckoutKey, checkout: Arc<ChartCheckout>) -> Arc<ChartCheckout> {
        let mut fetched = self.fetched.lock().unwrap_or_else(|e| e.into_inner());
        fetched.entry(key).or_insert(checkout).clone()
    }
}

fn handle(shared: Arc<ChartCheckout>) -> ChartCheckout {
    let dir = shared.dir().to_path_buf();
    ChartCheckout::new(dir, move || drop(shared))
}

#[async_trait]
impl ChartSource for CheckoutMemo {
    async fn fetch_chart(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        path: &str,
    ) -> Result<ChartCheckout, FetchError> {
        let key = (
            owner.to_string(),
            repo.to_string(),
            git_ref.to_string(),
            path.to_string(),
        );
        if let Some(shared) = self.cached(&key) {
            debug!("Reusing {} at {}", path, git_ref);
            return Ok(handle(shared));
        }

        let checkout = self.source.fetch_chart(owner, repo, git_ref, path).await?;
        Ok(handle(self.remember(key, Arc::new(checkout))))
    }
}
