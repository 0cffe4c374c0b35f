//! Declarative plugin specifications.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use super::hooks::Hook;
use crate::Result;
use crate::host::Host;

/// Async predicate deciding whether a plugin is enabled.
#[async_trait]
pub trait EnabledPredicate: Send + Sync {
    async fn evaluate(&self, host: &dyn Host) -> Result<bool>;
}

/// `enabled` value of a spec.
///
/// Deserializes from a boolean or from a host expression string.
#[derive(Clone)]
pub enum Enabled {
    Static(bool),
    /// Evaluated with [`Host::eval_bool`].
    Expr(String),
    Dynamic(Arc<dyn EnabledPredicate>),
}

impl Enabled {
    pub async fn evaluate(&self, host: &dyn Host) -> Result<bool> {
        match self {
            Enabled::Static(value) => Ok(*value),
            Enabled::Expr(expr) => host.eval_bool(expr).await,
            Enabled::Dynamic(predicate) => predicate.evaluate(host).await,
        }
    }
}

impl fmt::Debug for Enabled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Enabled::Static(v) => f.debug_tuple("Static").field(v).finish(),
            Enabled::Expr(e) => f.debug_tuple("Expr").field(e).finish(),
            Enabled::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for Enabled {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Static(bool),
            Expr(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Static(v) => Enabled::Static(v),
            Repr::Expr(e) => Enabled::Expr(e),
        })
    }
}

fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(v) => vec![v],
        OneOrMany::Many(v) => v,
    })
}

/// A key trigger: `lhs` in one or more modes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "KeyRepr")]
pub struct KeySpec {
    pub lhs: String,
    /// Keys returned on the first press instead of looking up a mapping.
    pub rhs: Option<String>,
    pub modes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyRepr {
    Lhs(String),
    Full {
        lhs: String,
        #[serde(default)]
        rhs: Option<String>,
        #[serde(default, alias = "modes", deserialize_with = "one_or_many")]
        mode: Vec<String>,
    },
}

impl From<KeyRepr> for KeySpec {
    fn from(repr: KeyRepr) -> Self {
        match repr {
            KeyRepr::Lhs(lhs) => KeySpec::new(lhs),
            KeyRepr::Full { lhs, rhs, mode } => {
                let mut key = KeySpec::new(lhs);
                key.rhs = rhs;
                if !mode.is_empty() {
                    key.modes = mode;
                }
                key
            }
        }
    }
}

impl KeySpec {
    /// Normal-mode key without replacement text.
    pub fn new(lhs: impl Into<String>) -> Self {
        Self {
            lhs: lhs.into(),
            rhs: None,
            modes: vec!["n".to_string()],
        }
    }

    pub fn rhs(mut self, rhs: impl Into<String>) -> Self {
        self.rhs = Some(rhs.into());
        self
    }

    pub fn modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let modes: Vec<String> = modes.into_iter().map(Into::into).collect();
        if !modes.is_empty() {
            self.modes = modes;
        }
        self
    }
}

/// Lazy-load descriptor: the plugin is fetched on the first matching trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LazySpec {
    #[serde(deserialize_with = "one_or_many")]
    pub keys: Vec<KeySpec>,
    #[serde(alias = "cmd", deserialize_with = "one_or_many")]
    pub commands: Vec<String>,
    #[serde(alias = "event", deserialize_with = "one_or_many")]
    pub autocmds: Vec<String>,
}

impl LazySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: KeySpec) -> Self {
        self.keys.push(key);
        self
    }

    pub fn command(mut self, name: impl Into<String>) -> Self {
        self.commands.push(name.into());
        self
    }

    pub fn autocmd(mut self, event: impl Into<String>) -> Self {
        self.autocmds.push(event.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.commands.is_empty() && self.autocmds.is_empty()
    }
}

/// User-supplied description of one plugin.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "SpecRepr")]
pub struct PluginSpec {
    /// `owner/repo`, `host/owner/repo` or an `http(s)` URL.
    pub url: String,
    pub dst: Option<PathBuf>,
    pub branch: Option<String>,
    /// Unset inherits the parent's evaluated value.
    pub enabled: Option<Enabled>,
    pub before: Option<Hook>,
    pub after: Option<Hook>,
    pub build: Option<Hook>,
    pub dependencies: Vec<PluginSpec>,
    pub lazy: Option<LazySpec>,
    pub profiles: Vec<String>,
    pub depth: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpecRepr {
    Url(String),
    Full(Box<SpecFields>),
}

#[derive(Deserialize)]
struct SpecFields {
    url: String,
    #[serde(default)]
    dst: Option<PathBuf>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    enabled: Option<Enabled>,
    #[serde(default)]
    before: Option<Hook>,
    #[serde(default)]
    after: Option<Hook>,
    #[serde(default)]
    build: Option<Hook>,
    #[serde(default)]
    dependencies: Vec<PluginSpec>,
    #[serde(default)]
    lazy: Option<LazySpec>,
    #[serde(default, alias = "profile", deserialize_with = "one_or_many")]
    profiles: Vec<String>,
    #[serde(default)]
    depth: Option<u32>,
}

impl From<SpecRepr> for PluginSpec {
    fn from(repr: SpecRepr) -> Self {
        match repr {
            SpecRepr::Url(url) => PluginSpec::new(url),
            SpecRepr::Full(fields) => {
                let f = *fields;
                PluginSpec {
                    url: f.url,
                    dst: f.dst,
                    branch: f.branch,
                    enabled: f.enabled,
                    before: f.before,
                    after: f.after,
                    build: f.build,
                    dependencies: f.dependencies,
                    lazy: f.lazy.filter(|l| !l.is_empty()),
                    profiles: f.profiles,
                    depth: f.depth,
                }
            }
        }
    }
}

impl PluginSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            dst: None,
            branch: None,
            enabled: None,
            before: None,
            after: None,
            build: None,
            dependencies: Vec::new(),
            lazy: None,
            profiles: Vec::new(),
            depth: None,
        }
    }

    pub fn dst(mut self, dst: impl Into<PathBuf>) -> Self {
        self.dst = Some(dst.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(Enabled::Static(enabled));
        self
    }

    pub fn enabled_when(mut self, expr: impl Into<String>) -> Self {
        self.enabled = Some(Enabled::Expr(expr.into()));
        self
    }

    pub fn enabled_by(mut self, predicate: impl EnabledPredicate + 'static) -> Self {
        self.enabled = Some(Enabled::Dynamic(Arc::new(predicate)));
        self
    }

    pub fn before(mut self, hook: Hook) -> Self {
        self.before = Some(hook);
        self
    }

    pub fn after(mut self, hook: Hook) -> Self {
        self.after = Some(hook);
        self
    }

    pub fn build_hook(mut self, hook: Hook) -> Self {
        self.build = Some(hook);
        self
    }

    pub fn dependency(mut self, spec: PluginSpec) -> Self {
        self.dependencies.push(spec);
        self
    }

    /// An empty descriptor leaves the plugin eager.
    pub fn lazy(mut self, lazy: LazySpec) -> Self {
        self.lazy = Some(lazy).filter(|l| !l.is_empty());
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profiles.push(profile.into());
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    struct Always(bool);

    #[async_trait]
    impl EnabledPredicate for Always {
        async fn evaluate(&self, _host: &dyn Host) -> Result<bool> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_spec_from_string() {
        let spec: PluginSpec = serde_json::from_str(r#""vim-denops/denops.vim""#).unwrap();
        assert_eq!(spec.url, "vim-denops/denops.vim");
        assert!(spec.enabled.is_none());
        assert!(!spec.is_lazy());
    }

    #[test]
    fn test_spec_full_object() {
        let spec: PluginSpec = serde_json::from_str(
            r#"{
                "url": "kana/vim-textobj-entire",
                "branch": "master",
                "enabled": false,
                "depth": 1,
                "profile": "work",
                "dependencies": ["kana/vim-textobj-user"],
                "lazy": {
                    "keys": [{"lhs": "ae", "mode": ["o", "x"]}, "ie"],
                    "cmd": "TextobjEntire",
                    "event": ["BufRead", "InsertEnter"]
                }
            }"#,
        )
        .unwrap();

        assert_eq!(spec.branch.as_deref(), Some("master"));
        assert!(matches!(spec.enabled, Some(Enabled::Static(false))));
        assert_eq!(spec.depth, Some(1));
        assert_eq!(spec.profiles, vec!["work"]);
        assert_eq!(spec.dependencies[0].url, "kana/vim-textobj-user");

        let lazy = spec.lazy.unwrap();
        assert_eq!(lazy.keys[0], KeySpec::new("ae").modes(["o", "x"]));
        assert_eq!(lazy.keys[1].modes, vec!["n"]);
        assert_eq!(lazy.commands, vec!["TextobjEntire"]);
        assert_eq!(lazy.autocmds, vec!["BufRead", "InsertEnter"]);
    }

    #[test]
    fn test_empty_lazy_is_eager() {
        let spec: PluginSpec = serde_json::from_str(r#"{"url": "a/b", "lazy": {}}"#).unwrap();
        assert!(!spec.is_lazy());
        assert!(!PluginSpec::new("a/b").lazy(LazySpec::new()).is_lazy());
    }

    #[tokio::test]
    async fn test_enabled_evaluation() {
        let host = MemoryHost::new().with_expression("has('nvim')", false);
        assert!(Enabled::Static(true).evaluate(&host).await.unwrap());
        assert!(
            !Enabled::Expr("has('nvim')".into())
                .evaluate(&host)
                .await
                .unwrap()
        );
        assert!(
            Enabled::Dynamic(Arc::new(Always(true)))
                .evaluate(&host)
                .await
                .unwrap()
        );
        assert!(Enabled::Expr("unknown()".into()).evaluate(&host).await.is_err());
    }

    #[test]
    fn test_builder() {
        let spec = PluginSpec::new("a/b")
            .branch("dev")
            .enabled_by(Always(false))
            .dependency(PluginSpec::new("c/d").enabled(true))
            .build_hook(Hook::shell("make"));
        assert!(matches!(spec.enabled, Some(Enabled::Dynamic(_))));
        assert!(matches!(spec.build, Some(Hook::Shell(_))));
        assert_eq!(spec.dependencies.len(), 1);
    }
}
