pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod explorer;
pub mod models;
pub mod state;
pub mod storage;

pub use config::{CoercionPolicy, ExplorerConfig};
pub use db::RecordStore;
pub use error::{ExplorerError, ExplorerResult, StoreError};
pub use explorer::ExplorerSession;
pub use state::AppState;

use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
