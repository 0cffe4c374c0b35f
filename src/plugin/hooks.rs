//! User hooks run around registration and after fetching.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::host::Host;
use crate::{Error, Result};

/// When a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookKind {
    /// Immediately before registration
    Before,
    /// Immediately after registration
    After,
    /// After a fresh clone, or after an update that moved the revision
    Build,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookKind::Before => "before",
            HookKind::After => "after",
            HookKind::Build => "build",
        })
    }
}

/// What a hook sees of the plugin it runs for.
pub struct HookContext<'a> {
    pub url: &'a str,
    pub name: &'a str,
    pub dst: &'a Path,
    pub host: &'a dyn Host,
}

impl HookContext<'_> {
    pub fn info(&self) -> HookInfo {
        HookInfo {
            url: self.url.to_string(),
            name: self.name.to_string(),
            dst: self.dst.to_path_buf(),
        }
    }
}

/// Owned copy of the plugin fields in a [`HookContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInfo {
    pub url: String,
    pub name: String,
    pub dst: PathBuf,
}

/// In-process hook.
#[async_trait]
pub trait PluginHook: Send + Sync {
    async fn execute(&self, ctx: &HookContext<'_>) -> Result<()>;
}

type HookFn = dyn Fn(HookInfo) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync;

/// Hook built from an async closure.
pub struct FnHook {
    f: Box<HookFn>,
}

impl FnHook {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HookInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            f: Box::new(move |info| Box::pin(f(info))),
        }
    }
}

#[async_trait]
impl PluginHook for FnHook {
    async fn execute(&self, ctx: &HookContext<'_>) -> Result<()> {
        (self.f)(ctx.info()).await
    }
}

/// A hook declared on a plugin spec.
///
/// In JSON a hook is either `{"ex": "<host command>"}` or
/// `{"shell": "<command>"}`; the shell command runs with the plugin directory
/// as its working directory.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hook {
    Ex(String),
    Shell(String),
    #[serde(skip_deserializing)]
    Custom(Arc<dyn PluginHook>),
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hook::Ex(cmd) => f.debug_tuple("Ex").field(cmd).finish(),
            Hook::Shell(cmd) => f.debug_tuple("Shell").field(cmd).finish(),
            Hook::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Hook {
    pub fn ex(command: impl Into<String>) -> Self {
        Hook::Ex(command.into())
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Hook::Shell(command.into())
    }

    pub fn custom(hook: impl PluginHook + 'static) -> Self {
        Hook::Custom(Arc::new(hook))
    }

    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(HookInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Hook::Custom(Arc::new(FnHook::new(f)))
    }

    /// Runs the hook. Every failure is reported as [`Error::HookFailure`].
    pub async fn run(&self, kind: HookKind, ctx: &HookContext<'_>) -> Result<()> {
        let result = match self {
            Hook::Ex(command) => ctx.host.execute(command).await,
            Hook::Shell(command) => run_shell(command, ctx.dst).await,
            Hook::Custom(hook) => hook.execute(ctx).await,
        };

        result.map_err(|e| match e {
            Error::HookFailure { .. } => e,
            other => Error::HookFailure {
                url: ctx.url.to_string(),
                kind,
                reason: other.to_string(),
            },
        })
    }
}

async fn run_shell(command: &str, cwd: &Path) -> Result<()> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let status = output
        .status
        .code()
        .map(|c| format!("exit status {}", c))
        .unwrap_or_else(|| "killed by signal".to_string());
    Err(Error::host(format!(
        "`{}` failed with {}: {}",
        command,
        status,
        stderr.trim()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn ctx<'a>(dst: &'a Path, host: &'a MemoryHost) -> HookContext<'a> {
        HookContext {
            url: "https://github.com/a/b",
            name: "b",
            dst,
            host,
        }
    }

    #[test]
    fn test_hook_deserialize() {
        let hook: Hook = serde_json::from_str(r#"{"ex": "call foo#setup()"}"#).unwrap();
        assert!(matches!(hook, Hook::Ex(ref c) if c == "call foo#setup()"));

        let hook: Hook = serde_json::from_str(r#"{"shell": "make"}"#).unwrap();
        assert!(matches!(hook, Hook::Shell(ref c) if c == "make"));

        assert!(serde_json::from_str::<Hook>(r#"{"custom": null}"#).is_err());
    }

    #[tokio::test]
    async fn test_ex_hook_goes_to_host() {
        let dir = tempdir().unwrap();
        let host = MemoryHost::new();
        Hook::ex("echo 'hi'")
            .run(HookKind::After, &ctx(dir.path(), &host))
            .await
            .unwrap();
        assert_eq!(host.executed(), vec!["echo 'hi'"]);
    }

    #[tokio::test]
    async fn test_shell_hook_runs_in_plugin_dir() {
        let dir = tempdir().unwrap();
        let host = MemoryHost::new();
        Hook::shell("touch built")
            .run(HookKind::Build, &ctx(dir.path(), &host))
            .await
            .unwrap();
        assert!(dir.path().join("built").exists());
    }

    #[tokio::test]
    async fn test_shell_hook_failure() {
        let dir = tempdir().unwrap();
        let host = MemoryHost::new();
        let err = Hook::shell("echo broken >&2; exit 3")
            .run(HookKind::Build, &ctx(dir.path(), &host))
            .await
            .unwrap_err();

        match err {
            Error::HookFailure { url, kind, reason } => {
                assert_eq!(url, "https://github.com/a/b");
                assert_eq!(kind, HookKind::Build);
                assert!(reason.contains("exit status 3"));
                assert!(reason.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_fn_hook_receives_info() {
        let dir = tempdir().unwrap();
        let host = MemoryHost::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let hook = Hook::from_fn(move |info| {
            let seen = seen.clone();
            async move {
                assert_eq!(info.name, "b");
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        hook.run(HookKind::Before, &ctx(dir.path(), &host))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
