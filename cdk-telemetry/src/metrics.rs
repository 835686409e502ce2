use std::{sync::Mutex, time::Duration};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::trace;

// Global cache for the Prometheus handle used by [`init_metrics_handle`].
//
// A [`Mutex`] is used instead of [`Once`], [`OnceCell`], or [`OnceLock`] because the
// initialization code is fallible. Ideally, we would use `OnceLock::get_or_try_init`,
// which allows fallible initialization, but it is currently unstable.
//
// The reason we must initialize only once is that [`PrometheusBuilder::install_recorder`]
// installs a global metrics recorder, and any later calls to it fail. While
// [`init_metrics`] is not called multiple times during normal operations, it is called
// multiple times during tests, so this caching mechanism is essential.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// How often the recorder's upkeep task runs to drain stale histogram samples.
const UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Initializes metrics with manual endpoint management and returns a handle for rendering.
///
/// This function is designed for services that need to integrate metrics into their
/// existing HTTP framework. It does not start an HTTP server; the caller uses the
/// returned [`PrometheusHandle`] to render metrics at a custom endpoint.
///
/// Multiple threads can safely call this method to get a handle. Initialization happens
/// only once, and subsequent calls return cloned handles from the cache.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let builder = PrometheusBuilder::new();

    let handle = builder.install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    let handle_clone = handle.clone();

    // This task periodically performs upkeep to avoid unbounded memory growth due to
    // histogram samples accumulating in the recorder.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPKEEP_INTERVAL);
        loop {
            interval.tick().await;

            trace!("running metrics upkeep");
            handle_clone.run_upkeep();
        }
    });

    Ok(handle)
}

/// Initializes the global metrics recorder, discarding the rendering handle.
///
/// Useful for processes that emit metrics but expose them through other means
/// (or not at all, as in tests).
pub fn init_metrics() -> Result<(), BuildError> {
    init_metrics_handle().map(|_| ())
}
