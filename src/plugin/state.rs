//! Plugin lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a plugin is in its lifecycle.
///
/// ```text
/// Added ──▶ Disabled
///   │
///   ├──▶ Installing ──▶ InstallFailed ──▶ Installing | Installed (retry)
///   │        │
///   │        ├──▶ BuildFailed ──▶ Installing | Installed (retry)
///   │        ▼
///   └──▶ Installed ◀─▶ Registering ──▶ Registered ──▶ Loaded
/// ```
///
/// A failed registration falls back to `Installed` so it can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Added,
    Disabled,
    Installing,
    Installed,
    InstallFailed,
    Registering,
    Registered,
    /// `after/plugin` scripts sourced.
    Loaded,
    BuildFailed,
}

impl PluginState {
    pub fn can_transition_to(self, next: PluginState) -> bool {
        use PluginState::*;
        matches!(
            (self, next),
            (Added, Disabled)
                | (Added, Installing)
                | (Added, Installed)
                | (Installing, Installed)
                | (Installing, InstallFailed)
                | (Installing, BuildFailed)
                | (InstallFailed, Installing)
                | (InstallFailed, Installed)
                | (BuildFailed, Installing)
                | (BuildFailed, Installed)
                | (Installed, Registering)
                | (Registering, Registered)
                | (Registering, Installed)
                | (Registered, Loaded)
        )
    }

    /// Registered or loaded: scripts are on the search path.
    pub fn is_registered(self) -> bool {
        matches!(self, PluginState::Registered | PluginState::Loaded)
    }

    pub fn is_failed(self) -> bool {
        matches!(self, PluginState::InstallFailed | PluginState::BuildFailed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PluginState::Added => "added",
            PluginState::Disabled => "disabled",
            PluginState::Installing => "installing",
            PluginState::Installed => "installed",
            PluginState::InstallFailed => "install_failed",
            PluginState::Registering => "registering",
            PluginState::Registered => "registered",
            PluginState::Loaded => "loaded",
            PluginState::BuildFailed => "build_failed",
        }
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
