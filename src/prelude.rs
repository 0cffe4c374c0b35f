//! Prelude module for convenient imports.
//!
//! ```rust
//! use lazyplug::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::Result;
pub use crate::{Manager, ManagerBuilder};

// Specs
pub use crate::plugin::{Enabled, Hook, HookKind, KeySpec, LazySpec, PluginSpec};

// Lifecycle
pub use crate::plugin::{InstallOutcome, Plugin, PluginState, UpdateOutcome, UpdateStatus};

// Triggers
pub use crate::lazy::{Trigger, TriggerBinding};

// Capabilities
pub use crate::host::{Host, MemoryHost, NotifyLevel};
pub use crate::vcs::{GitCli, VersionControl};

// Configuration
pub use crate::config::{EnvOverrides, ManagerConfig, SettingsLoader};

// Reports
pub use crate::manager::{BatchReport, PluginSummary};
