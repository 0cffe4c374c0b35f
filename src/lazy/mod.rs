//! Lazy-load triggers.
//!
//! A lazy plugin is represented in the host only by placeholder bindings. The
//! [`LazyIndex`] remembers which plugin owns which trigger and which bindings
//! are currently armed; the manager disarms them on the first trigger and
//! re-arms them if that load fails.

use std::fmt;

use dashmap::DashMap;
use serde::Serialize;

use crate::plugin::LazySpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Key,
    Command,
    Autocmd,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerKind::Key => "key",
            TriggerKind::Command => "command",
            TriggerKind::Autocmd => "autocmd",
        })
    }
}

/// The user action that fired a placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Key {
        lhs: String,
        /// Mode the key was pressed in; `None` uses the first declared mode.
        mode: Option<String>,
    },
    Command {
        name: String,
        args: String,
        bang: bool,
    },
    Autocmd {
        event: String,
    },
}

impl Trigger {
    pub fn key(lhs: impl Into<String>) -> Self {
        Trigger::Key {
            lhs: lhs.into(),
            mode: None,
        }
    }

    pub fn key_in(mode: impl Into<String>, lhs: impl Into<String>) -> Self {
        Trigger::Key {
            lhs: lhs.into(),
            mode: Some(mode.into()),
        }
    }

    pub fn command(name: impl Into<String>) -> Self {
        Trigger::Command {
            name: name.into(),
            args: String::new(),
            bang: false,
        }
    }

    pub fn command_with(name: impl Into<String>, args: impl Into<String>, bang: bool) -> Self {
        Trigger::Command {
            name: name.into(),
            args: args.into(),
            bang,
        }
    }

    pub fn autocmd(event: impl Into<String>) -> Self {
        Trigger::Autocmd {
            event: event.into(),
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Key { .. } => TriggerKind::Key,
            Trigger::Command { .. } => TriggerKind::Command,
            Trigger::Autocmd { .. } => TriggerKind::Autocmd,
        }
    }

    fn index_key(&self) -> (TriggerKind, String) {
        match self {
            Trigger::Key { lhs, .. } => (TriggerKind::Key, lhs.clone()),
            Trigger::Command { name, .. } => (TriggerKind::Command, name.clone()),
            Trigger::Autocmd { event } => (TriggerKind::Autocmd, event.clone()),
        }
    }
}

/// Placeholder the host defines for one trigger of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TriggerBinding {
    Key {
        url: String,
        lhs: String,
        rhs: Option<String>,
        modes: Vec<String>,
    },
    Command {
        url: String,
        name: String,
    },
    Autocmd {
        url: String,
        event: String,
    },
}

impl TriggerBinding {
    pub fn url(&self) -> &str {
        match self {
            TriggerBinding::Key { url, .. }
            | TriggerBinding::Command { url, .. }
            | TriggerBinding::Autocmd { url, .. } => url,
        }
    }

    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerBinding::Key { .. } => TriggerKind::Key,
            TriggerBinding::Command { .. } => TriggerKind::Command,
            TriggerBinding::Autocmd { .. } => TriggerKind::Autocmd,
        }
    }

    fn index_key(&self) -> (TriggerKind, String) {
        match self {
            TriggerBinding::Key { lhs, .. } => (TriggerKind::Key, lhs.clone()),
            TriggerBinding::Command { name, .. } => (TriggerKind::Command, name.clone()),
            TriggerBinding::Autocmd { event, .. } => (TriggerKind::Autocmd, event.clone()),
        }
    }

    /// One binding per declared key, command and event.
    pub fn bindings_for(url: &str, lazy: &LazySpec) -> Vec<TriggerBinding> {
        let keys = lazy.keys.iter().map(|k| TriggerBinding::Key {
            url: url.to_string(),
            lhs: k.lhs.clone(),
            rhs: k.rhs.clone(),
            modes: k.modes.clone(),
        });
        let commands = lazy.commands.iter().map(|c| TriggerBinding::Command {
            url: url.to_string(),
            name: c.clone(),
        });
        let autocmds = lazy.autocmds.iter().map(|e| TriggerBinding::Autocmd {
            url: url.to_string(),
            event: e.clone(),
        });
        keys.chain(commands).chain(autocmds).collect()
    }
}

/// Trigger ownership plus the set of bindings currently armed in the host.
#[derive(Debug, Default)]
pub struct LazyIndex {
    owners: DashMap<(TriggerKind, String), Vec<String>>,
    armed: DashMap<String, Vec<TriggerBinding>>,
}

impl LazyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records ownership and marks `bindings` armed for `url`.
    pub fn arm(&self, url: &str, bindings: Vec<TriggerBinding>) {
        for binding in &bindings {
            let mut owners = self.owners.entry(binding.index_key()).or_default();
            if !owners.iter().any(|o| o == url) {
                owners.push(url.to_string());
            }
        }
        self.armed.insert(url.to_string(), bindings);
    }

    /// Takes the armed bindings of `url`. Only the first caller gets them.
    pub fn disarm(&self, url: &str) -> Vec<TriggerBinding> {
        self.armed
            .remove(url)
            .map(|(_, bindings)| bindings)
            .unwrap_or_default()
    }

    /// Puts bindings back after a failed load.
    pub fn rearm(&self, url: &str, bindings: Vec<TriggerBinding>) {
        if !bindings.is_empty() {
            self.armed.insert(url.to_string(), bindings);
        }
    }

    pub fn is_armed(&self, url: &str) -> bool {
        self.armed.contains_key(url)
    }

    pub fn bindings(&self, url: &str) -> Vec<TriggerBinding> {
        self.armed
            .get(url)
            .map(|b| b.value().clone())
            .unwrap_or_default()
    }

    /// Plugins that declared this trigger, in the order they were added.
    pub fn owners(&self, trigger: &Trigger) -> Vec<String> {
        self.owners
            .get(&trigger.index_key())
            .map(|o| o.value().clone())
            .unwrap_or_default()
    }

    /// Forgets `url` entirely.
    pub fn forget(&self, url: &str) -> Vec<TriggerBinding> {
        for mut entry in self.owners.iter_mut() {
            entry.value_mut().retain(|o| o != url);
        }
        self.owners.retain(|_, owners| !owners.is_empty());
        self.disarm(url)
    }
}
