//! In-memory host that records every call.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Host, NotifyLevel};
use crate::lazy::TriggerBinding;
use crate::{Error, Result};

/// One recorded host interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    SetSearchPath(Vec<PathBuf>),
    Source(PathBuf),
    LoadSubPlugin { name: String, script: PathBuf },
    HelpTags(PathBuf),
    Execute(String),
    EmitEvent(String),
    DefineTrigger(TriggerBinding),
    RemoveTrigger(TriggerBinding),
    Finalize,
    Notify { level: NotifyLevel, message: String },
}

#[derive(Debug, Default)]
struct MemoryState {
    calls: Vec<HostCall>,
    search_path: Vec<PathBuf>,
    triggers: Vec<TriggerBinding>,
    expressions: HashMap<String, bool>,
    mappings: HashMap<(String, String), String>,
    source_mappings: Vec<SourceMapping>,
}

#[derive(Debug, Clone)]
struct SourceMapping {
    path_fragment: String,
    mode: String,
    lhs: String,
    rhs: String,
}

/// [`Host`] that keeps everything in memory.
///
/// Useful for tests and dry runs: expressions are answered from a table,
/// mappings can be declared up front or appear when a matching script is
/// sourced, and every call is appended to a log.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<MemoryState>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `eval_bool(expr)` with `value`. Unknown expressions are errors.
    pub fn with_expression(self, expr: impl Into<String>, value: bool) -> Self {
        self.lock().expressions.insert(expr.into(), value);
        self
    }

    pub fn with_mapping(
        self,
        mode: impl Into<String>,
        lhs: impl Into<String>,
        rhs: impl Into<String>,
    ) -> Self {
        self.lock()
            .mappings
            .insert((mode.into(), lhs.into()), rhs.into());
        self
    }

    /// Defines the mapping once a sourced path contains `path_fragment`.
    pub fn map_on_source(
        self,
        path_fragment: impl Into<String>,
        mode: impl Into<String>,
        lhs: impl Into<String>,
        rhs: impl Into<String>,
    ) -> Self {
        self.lock().source_mappings.push(SourceMapping {
            path_fragment: path_fragment.into(),
            mode: mode.into(),
            lhs: lhs.into(),
            rhs: rhs.into(),
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: HostCall) {
        self.lock().calls.push(call);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }

    pub fn sourced(&self) -> Vec<PathBuf> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Source(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// The search path as last pushed.
    pub fn search_path(&self) -> Vec<PathBuf> {
        self.lock().search_path.clone()
    }

    /// Every search path pushed, oldest first.
    pub fn search_path_history(&self) -> Vec<Vec<PathBuf>> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HostCall::SetSearchPath(entries) => Some(entries.clone()),
                _ => None,
            })
            .collect()
    }

    /// Placeholder triggers currently defined.
    pub fn triggers(&self) -> Vec<TriggerBinding> {
        self.lock().triggers.clone()
    }

    pub fn executed(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Execute(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HostCall::EmitEvent(event) => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn finalized(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, HostCall::Finalize))
            .count()
    }

    pub fn notifications(&self) -> Vec<(NotifyLevel, String)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                HostCall::Notify { level, message } => Some((*level, message.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Host for MemoryHost {
    async fn set_search_path(&self, entries: &[PathBuf]) -> Result<()> {
        let mut state = self.lock();
        state.search_path = entries.to_vec();
        state.calls.push(HostCall::SetSearchPath(entries.to_vec()));
        Ok(())
    }

    async fn source(&self, path: &Path) -> Result<()> {
        let mut state = self.lock();
        let rendered = path.to_string_lossy();
        let defined: Vec<SourceMapping> = state
            .source_mappings
            .iter()
            .filter(|m| rendered.contains(&m.path_fragment))
            .cloned()
            .collect();
        for m in defined {
            state.mappings.insert((m.mode, m.lhs), m.rhs);
        }
        state.calls.push(HostCall::Source(path.to_path_buf()));
        Ok(())
    }

    async fn load_sub_plugin(&self, name: &str, script: &Path) -> Result<()> {
        self.record(HostCall::LoadSubPlugin {
            name: name.to_string(),
            script: script.to_path_buf(),
        });
        Ok(())
    }

    async fn generate_help_tags(&self, doc_dir: &Path) -> Result<()> {
        self.record(HostCall::HelpTags(doc_dir.to_path_buf()));
        Ok(())
    }

    async fn execute(&self, command: &str) -> Result<()> {
        self.record(HostCall::Execute(command.to_string()));
        Ok(())
    }

    async fn emit_event(&self, event: &str) -> Result<()> {
        self.record(HostCall::EmitEvent(event.to_string()));
        Ok(())
    }

    async fn eval_bool(&self, expr: &str) -> Result<bool> {
        self.lock()
            .expressions
            .get(expr)
            .copied()
            .ok_or_else(|| Error::host(format!("cannot evaluate '{}'", expr)))
    }

    async fn define_trigger(&self, binding: &TriggerBinding) -> Result<()> {
        let mut state = self.lock();
        if !state.triggers.contains(binding) {
            state.triggers.push(binding.clone());
        }
        state.calls.push(HostCall::DefineTrigger(binding.clone()));
        Ok(())
    }

    async fn remove_trigger(&self, binding: &TriggerBinding) -> Result<()> {
        let mut state = self.lock();
        state.triggers.retain(|b| b != binding);
        state.calls.push(HostCall::RemoveTrigger(binding.clone()));
        Ok(())
    }

    async fn find_mapping(&self, mode: &str, lhs: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .mappings
            .get(&(mode.to_string(), lhs.to_string()))
            .cloned())
    }

    async fn finalize(&self) -> Result<()> {
        self.record(HostCall::Finalize);
        Ok(())
    }

    async fn notify(&self, level: NotifyLevel, message: &str) -> Result<()> {
        self.record(HostCall::Notify {
            level,
            message: message.to_string(),
        });
        Ok(())
    }
}
