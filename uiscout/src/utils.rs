use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `tracing` subscriber at `level`; `RUST_LOG` takes precedence.
/// Does nothing when a global subscriber is already set.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .try_init();
}
