//! # lazyplug
//!
//! Dependency-aware plugin manager engine for programmable text editors.
//!
//! Given a list of [`PluginSpec`]s the [`Manager`] clones each plugin with
//! version control into `<base>/<host>/<owner>/<repo>`, appends it to the
//! editor's search path, sources its startup scripts and runs its hooks.
//! Plugins that declare a lazy descriptor are not fetched at all until one of
//! their triggers (key, command or autocommand) fires; the first trigger loads
//! the plugin exactly once and replays the user's action.
//!
//! The editor and the version-control backend are capabilities supplied by
//! the caller through the [`Host`] and [`VersionControl`] traits.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lazyplug::{KeySpec, LazySpec, Manager, ManagerConfig, MemoryHost, PluginSpec, Trigger};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lazyplug::Error> {
//!     let manager = Manager::builder(Arc::new(MemoryHost::new()))
//!         .config(ManagerConfig::new("/tmp/plugins").with_concurrency(4))
//!         .build()?;
//!
//!     manager
//!         .add(PluginSpec::new("vim-denops/denops.vim"))
//!         .await?;
//!     manager
//!         .add(
//!             PluginSpec::new("kana/vim-textobj-entire")
//!                 .lazy(LazySpec::new().key(KeySpec::new("ae").modes(["o", "x"]))),
//!         )
//!         .await?;
//!     manager.end().await?;
//!
//!     // Called back by the placeholder mapping the host defined for `ae`.
//!     let keys = manager
//!         .load("kana/vim-textobj-entire", Trigger::key("ae"))
//!         .await?;
//!     println!("{:?}", keys);
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod host;
pub mod lazy;
pub mod manager;
pub mod observability;
pub mod plugin;
pub mod prelude;
pub mod sync;
pub mod vcs;

pub use config::{ConfigError, EnvOverrides, ManagerConfig, Settings, SettingsLoader};
pub use host::{Host, HostCall, MemoryHost, NotifyLevel};
pub use lazy::{LazyIndex, Trigger, TriggerBinding, TriggerKind};
pub use manager::{
    BatchFailure, BatchOperation, BatchReport, DependencyGraph, Manager, ManagerBuilder,
    PluginSummary,
};
pub use observability::{Counter, Gauge, ManagerMetrics, MetricsSummary};
pub use plugin::{
    Enabled, EnabledPredicate, FnHook, Hook, HookContext, HookInfo, HookKind, InstallOutcome,
    KeySpec, LazySpec, LifecycleContext, Plugin, PluginHook, PluginInfo, PluginSpec, PluginState,
    UpdateOutcome, UpdateStatus,
};
pub use sync::{ConcurrencyController, OperationPermit, SearchPath};
pub use vcs::{CloneRequest, GitCli, VcsError, VersionControl};

use serde::Serialize;

/// Error type for lazyplug operations.
///
/// Variants that concern one plugin carry its canonical URL so batch reports
/// and user notifications can name the failing plugin.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No plugin with this URL is registered.
    #[error("Plugin not found: {url}")]
    NotFound { url: String },

    /// The clone process failed.
    #[error("Failed to install {url}: {source}")]
    InstallFailure {
        url: String,
        #[source]
        source: VcsError,
    },

    /// Checkout or pull failed. The previous checkout is left in place.
    #[error("Failed to update {url}: {source}")]
    UpdateFailure {
        url: String,
        #[source]
        source: VcsError,
    },

    /// A user-declared `before`, `after` or `build` hook failed.
    #[error("{kind} hook failed for {url}: {reason}")]
    HookFailure {
        url: String,
        kind: HookKind,
        reason: String,
    },

    /// Capability deliberately left out.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A plugin depends on itself through its dependency chain.
    #[error("Dependency cycle detected: {}", chain.join(" -> "))]
    DependencyCycle { chain: Vec<String> },

    /// The spec cannot be resolved to a destination.
    #[error("Invalid plugin spec '{url}': {reason}")]
    InvalidSpec { url: String, reason: String },

    /// The lifecycle was asked to do something its current state forbids.
    #[error("Cannot {operation} {url} while it is {state}")]
    InvalidState {
        url: String,
        state: PluginState,
        operation: &'static str,
    },

    /// A dependency is stuck in a failed state; retry it with
    /// `install_all(Some(dependency))` first.
    #[error("Cannot load {url}: dependency {dependency} is {state}")]
    DependencyFailed {
        url: String,
        dependency: String,
        state: PluginState,
    },

    /// `add` after a successful `end`.
    #[error("Manager is finalized; cannot add {url}")]
    Finalized { url: String },

    /// The host editor rejected a call.
    #[error("Host error: {0}")]
    Host(String),

    /// Version-control failure outside install/update.
    #[error("Version control error: {0}")]
    Vcs(#[from] VcsError),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Script discovery used an invalid pattern.
    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad specs, unknown URLs, configuration problems
    Configuration,
    /// Clone, pull or other version-control failures
    Fetch,
    /// User hook failures
    Hook,
    /// Lifecycle or manager state violations
    State,
    /// Host, IO and serialization failures
    Internal,
}

impl Error {
    pub fn host(message: impl Into<String>) -> Self {
        Error::Host(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotFound { .. }
            | Error::InvalidSpec { .. }
            | Error::DependencyCycle { .. }
            | Error::NotImplemented(_)
            | Error::Config(_) => ErrorCategory::Configuration,

            Error::InstallFailure { .. } | Error::UpdateFailure { .. } | Error::Vcs(_) => {
                ErrorCategory::Fetch
            }

            Error::HookFailure { .. } => ErrorCategory::Hook,

            Error::InvalidState { .. }
            | Error::DependencyFailed { .. }
            | Error::Finalized { .. } => ErrorCategory::State,

            Error::Host(_) | Error::Glob(_) | Error::Io(_) | Error::Json(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// The plugin URL this error is about, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Error::NotFound { url }
            | Error::InstallFailure { url, .. }
            | Error::UpdateFailure { url, .. }
            | Error::HookFailure { url, .. }
            | Error::InvalidSpec { url, .. }
            | Error::InvalidState { url, .. }
            | Error::DependencyFailed { url, .. }
            | Error::Finalized { url } => Some(url),
            _ => None,
        }
    }

    pub fn is_fetch_error(&self) -> bool {
        self.category() == ErrorCategory::Fetch
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Result type alias for lazyplug operations.
pub type Result<T> = std::result::Result<T, Error>;
