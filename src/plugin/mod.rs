//! Plugin model and lifecycle.
//!
//! A [`PluginSpec`] is what the user declares. Resolving it yields a
//! [`PluginInfo`] (canonical URL and destination), and the [`Plugin`] built
//! from both carries the [`PluginState`] through install, registration and
//! loading.
//!
//! # Directory layout
//!
//! ```text
//! <base>/
//! └── github.com/
//!     └── kana/
//!         └── vim-textobj-entire/
//!             ├── plugin/            sourced on register
//!             ├── after/plugin/      sourced by Manager::end or on lazy load
//!             ├── denops/<name>/     sub-plugin entry points (main.ts, main.js)
//!             └── doc/               help tags generated after clone
//! ```

mod hooks;
mod info;
mod lifecycle;
mod scripts;
mod spec;
mod state;

pub use hooks::{FnHook, Hook, HookContext, HookInfo, HookKind, PluginHook};
pub use info::{PluginInfo, canonical_url};
pub use lifecycle::{
    InstallOutcome, LifecycleContext, Plugin, UpdateOutcome, UpdateStatus,
};
pub use spec::{Enabled, EnabledPredicate, KeySpec, LazySpec, PluginSpec};
pub use state::PluginState;
