//! Logging initialization

use tracing_subscriber::EnvFilter;

use super::constants::{APP_NAME_LOWER, ENV_LOG};

/// Initialize the tracing subscriber.
///
/// Filter resolution: `AGENTLENS_LOG`, then `RUST_LOG`, then an `info`
/// default scoped to this crate.
pub fn init_logging() {
    let default_filter = format!("info,{}=info", APP_NAME_LOWER);

    let filter = std::env::var(ENV_LOG)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or(default_filter);

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}
