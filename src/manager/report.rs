//! Results of bulk operations and registry listings.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::plugin::{Plugin, PluginState, UpdateOutcome};
use crate::{Error, ErrorCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchOperation {
    Install,
    Update,
}

/// One member of a bulk operation that failed.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub url: String,
    pub error: String,
    pub category: ErrorCategory,
}

impl BatchFailure {
    pub fn new(url: impl Into<String>, error: &Error) -> Self {
        Self {
            url: url.into(),
            error: error.to_string(),
            category: error.category(),
        }
    }
}

/// Outcome of `install_all` / `update_all`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub operation: BatchOperation,
    pub succeeded: Vec<String>,
    pub failures: Vec<BatchFailure>,
    /// Per-plugin update results; empty for installs.
    pub updates: Vec<UpdateOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub(crate) fn new(operation: BatchOperation) -> Self {
        let now = Utc::now();
        Self {
            operation,
            succeeded: Vec::new(),
            failures: Vec::new(),
            updates: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_urls(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.url.as_str()).collect()
    }

    /// Updates that installed or moved a plugin.
    pub fn changed(&self) -> Vec<&UpdateOutcome> {
        self.updates.iter().filter(|u| u.changed()).collect()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Registry entry as returned by `Manager::list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub url: String,
    pub name: String,
    pub dst: PathBuf,
    pub branch: Option<String>,
    pub state: PluginState,
    pub lazy: bool,
    pub loaded: bool,
}

impl From<&Plugin> for PluginSummary {
    fn from(plugin: &Plugin) -> Self {
        let info = plugin.info();
        Self {
            url: info.url.clone(),
            name: info.name.clone(),
            dst: info.dst.clone(),
            branch: info.branch.clone(),
            state: plugin.state(),
            lazy: plugin.is_lazy(),
            loaded: plugin.is_loaded(),
        }
    }
}
