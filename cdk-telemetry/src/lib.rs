//! Process-level telemetry initialization for connector kit services.
//!
//! Provides one-shot installers for the tracing subscriber and the Prometheus
//! metrics recorder. Both are safe to call multiple times, which matters for
//! tests where many entry points race to initialize telemetry.

mod metrics;
mod tracing;

pub use self::metrics::{init_metrics, init_metrics_handle};
pub use self::tracing::init_tracing;
