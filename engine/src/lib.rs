mod checkouts;
mod cmd;
mod differ;
mod env_diff;
pub mod index;
mod mirror;
mod orchestrator;
mod render;
mod resolver;

pub use checkouts::CheckoutMemo;
pub use differ::{unified_diff, DyffDiffer, LineDiffer};
pub use env_diff::EnvironmentDiffer;
pub use index::{ConfigIndex, FolderPattern, IndexState};
pub use mirror::{GitMirror, DEFAULT_SYNC_INTERVAL};
pub use orchestrator::DiffOrchestrator;
pub use render::HelmRenderer;
pub use resolver::{
    ChartConfigResolver, DirectoryConventionSource, IndexSource, DEFAULT_ENV_DIR,
    DEFAULT_VALUES_SUFFIX,
};
