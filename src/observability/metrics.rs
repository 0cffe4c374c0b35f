//! Operation counters for a manager instance.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Thread-safe atomic gauge.
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: i64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Counters shared by every lifecycle operation of one manager.
#[derive(Debug, Default)]
pub struct ManagerMetrics {
    pub clones: Counter,
    pub pulls: Counter,
    pub install_failures: Counter,
    pub update_failures: Counter,
    pub hook_failures: Counter,
    pub lazy_loads: Counter,
    /// Placeholder bindings currently defined in the host.
    pub armed_triggers: Gauge,
}

impl ManagerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_clone(&self, success: bool) {
        self.clones.inc();
        if !success {
            self.install_failures.inc();
        }
    }

    pub fn record_pull(&self, success: bool) {
        self.pulls.inc();
        if !success {
            self.update_failures.inc();
        }
    }

    pub fn record_hook_failure(&self) {
        self.hook_failures.inc();
    }

    pub fn record_lazy_load(&self) {
        self.lazy_loads.inc();
    }

    /// `peak_in_flight` comes from the concurrency controller.
    pub fn snapshot(&self, peak_in_flight: usize) -> MetricsSummary {
        MetricsSummary {
            clones: self.clones.get(),
            pulls: self.pulls.get(),
            install_failures: self.install_failures.get(),
            update_failures: self.update_failures.get(),
            hook_failures: self.hook_failures.get(),
            lazy_loads: self.lazy_loads.get(),
            armed_triggers: self.armed_triggers.get(),
            peak_in_flight,
        }
    }
}

/// Point-in-time copy of [`ManagerMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub clones: u64,
    pub pulls: u64,
    pub install_failures: u64,
    pub update_failures: u64,
    pub hook_failures: u64,
    pub lazy_loads: u64,
    pub armed_triggers: i64,
    pub peak_in_flight: usize,
}
