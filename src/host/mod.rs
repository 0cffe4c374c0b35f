//! Editor capabilities the manager drives.
//!
//! The manager never talks to an editor directly. Every side effect on the
//! editor (search path, sourcing, placeholder triggers, replay) goes through
//! the [`Host`] trait so an embedding can map it onto a real editor RPC
//! channel, and tests can use [`MemoryHost`].

mod memory;

pub use memory::{HostCall, MemoryHost};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::lazy::TriggerBinding;

/// Severity of a message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

#[async_trait]
pub trait Host: Send + Sync {
    /// Replaces the editor's plugin search path.
    async fn set_search_path(&self, entries: &[PathBuf]) -> Result<()>;

    /// Sources a `.vim` or `.lua` script.
    async fn source(&self, path: &Path) -> Result<()>;

    /// Starts a sub-plugin runtime entry point, e.g. `denops/<name>/main.ts`.
    async fn load_sub_plugin(&self, name: &str, script: &Path) -> Result<()>;

    async fn generate_help_tags(&self, doc_dir: &Path) -> Result<()>;

    /// Runs an editor command line.
    async fn execute(&self, command: &str) -> Result<()>;

    /// Fires an autocommand event.
    async fn emit_event(&self, event: &str) -> Result<()>;

    /// Evaluates an editor expression as a boolean.
    async fn eval_bool(&self, expr: &str) -> Result<bool>;

    /// Installs a placeholder that calls back into `Manager::load`.
    async fn define_trigger(&self, binding: &TriggerBinding) -> Result<()>;

    async fn remove_trigger(&self, binding: &TriggerBinding) -> Result<()>;

    /// Right-hand side of the mapping for `lhs` in `mode`, if one exists.
    async fn find_mapping(&self, mode: &str, lhs: &str) -> Result<Option<String>>;

    /// Called once by `Manager::end` after startup scripts are sourced.
    async fn finalize(&self) -> Result<()> {
        Ok(())
    }

    async fn notify(&self, _level: NotifyLevel, _message: &str) -> Result<()> {
        Ok(())
    }
}
