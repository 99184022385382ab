pub mod app;
pub mod config;
pub mod error;

pub use app::App;
pub use config::{
    BroadcastConfig, Config, ForecasterConfig, IngestConfig, LocationKey, ProviderConfig,
    ServerConfig, StoreConfig, ValidationResult,
};
pub use error::{
    AppError, ConfigError, DatabaseError, FetchError, IngestError, ReqwestErrorExt,
    RusqliteErrorExt,
};

use anyhow::Result;

/// Initialize logging for the process.
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call more than once; later
/// calls are no-ops.
pub fn init() -> Result<()> {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("wxhub core initialized");
    }
    Ok(())
}
