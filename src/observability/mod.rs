//! Metrics and tracing helpers.
//!
//! Every manager owns a [`ManagerMetrics`] registry of atomic counters; lifecycle
//! operations run inside the named spans from [`spans`].
//!
//! Enable the `subscriber` feature for a ready-made `tracing-subscriber` setup:
//!
//! ```toml
//! lazyplug = { version = "0.1", features = ["subscriber"] }
//! ```

mod metrics;
pub mod spans;

pub use metrics::{Counter, Gauge, ManagerMetrics, MetricsSummary};
pub use spans::OperationSpan;

/// Installs a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"lazyplug=info"`).
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "subscriber")]
pub fn init_tracing_subscriber(default_directive: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
