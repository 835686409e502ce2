use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber with an environment-driven filter.
///
/// The filter is read from `RUST_LOG`, defaulting to `info` when unset. Returns
/// without error if a subscriber was already installed, so tests and binaries
/// can both call this unconditionally.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
