use tracing_subscriber::EnvFilter;

use crate::args::LogLevel;

/// Initializes the process-wide `tracing` subscriber. `RELAYSCOPE_LOG`, when
/// set, overrides `--log-level` with a full `EnvFilter` directive string.
pub fn init(level: LogLevel) {
    let filter = std::env::var("RELAYSCOPE_LOG")
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(format!("relayscope={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
