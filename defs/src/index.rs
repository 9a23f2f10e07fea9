use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One deployment of a chart into one environment, as found in the config repository.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub chart_name: String,
    /// Chart name from a Helm repository, or a path inside the source repository.
    pub chart_path: String,
    pub environment: String,
    pub value_files: Vec<String>,
    pub repo_url: String,
}

/// Entries grouped by chart name, in discovery order.
pub type IndexSnapshot = HashMap<String, Vec<IndexEntry>>;
