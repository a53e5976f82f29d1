use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber.
///
/// - Debug builds: pretty-printed human-readable output
/// - Release builds: JSON-formatted output for log aggregation
///
/// The log level comes from the `RUST_LOG` environment variable, defaulting
/// to `info`.
pub fn init_tracing() {
    let filter = env_filter();

    if cfg!(debug_assertions) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    }
}

/// Like [`init_tracing`], but does nothing when a subscriber is already
/// installed. For test binaries and examples that cannot guarantee they run
/// first.
pub fn try_init_tracing() {
    let filter = env_filter();

    let _ = if cfg!(debug_assertions) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init()
    };
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
