use std::time::Instant;

use tracing_subscriber::EnvFilter;

/// Milliseconds elapsed since `start`.
pub fn elapsed_millis(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Logs to stderr, filtered by `RUST_LOG` if set and by `level` otherwise.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
