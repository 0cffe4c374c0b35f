//! Per-plugin install, register, update and load operations.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tracing::Instrument;

use super::hooks::{HookContext, HookKind};
use super::info::PluginInfo;
use super::scripts::{self, AFTER_SCRIPTS, STARTUP_SCRIPTS};
use super::spec::PluginSpec;
use super::state::PluginState;
use crate::config::ManagerConfig;
use crate::host::Host;
use crate::observability::{ManagerMetrics, spans};
use crate::sync::ConcurrencyController;
use crate::vcs::{CloneRequest, GitCli, VcsError, VersionControl};
use crate::{Error, Result};

/// Shared capabilities passed to every lifecycle operation.
#[derive(Clone)]
pub struct LifecycleContext {
    pub host: Arc<dyn Host>,
    pub vcs: Arc<dyn VersionControl>,
    pub controller: ConcurrencyController,
    pub metrics: Arc<ManagerMetrics>,
    pub config: Arc<ManagerConfig>,
}

impl LifecycleContext {
    pub fn new(host: Arc<dyn Host>, config: ManagerConfig) -> Self {
        Self {
            host,
            vcs: Arc::new(GitCli::new()),
            controller: ConcurrencyController::new(config.concurrency),
            metrics: Arc::new(ManagerMetrics::new()),
            config: Arc::new(config),
        }
    }

    pub fn with_vcs(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = vcs;
        self
    }
}

impl fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("vcs", &self.vcs.name())
            .field("controller", &self.controller)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Result of [`Plugin::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallOutcome {
    /// Disabled plugin, nothing done
    Skipped,
    /// Destination already present
    AlreadyInstalled,
    /// Destination present; a previously failed build hook succeeded this time
    Rebuilt,
    Cloned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    Skipped,
    /// The destination was missing and has been cloned.
    Installed,
    UpToDate,
    Updated,
}

/// Result of [`Plugin::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub url: String,
    pub status: UpdateStatus,
    pub from: Option<String>,
    pub to: Option<String>,
    /// One-line subjects of the new commits, newest first.
    pub commits: Vec<String>,
}

impl UpdateOutcome {
    fn without_revisions(url: &str, status: UpdateStatus) -> Self {
        Self {
            url: url.to_string(),
            status,
            from: None,
            to: None,
            commits: Vec::new(),
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self.status, UpdateStatus::Installed | UpdateStatus::Updated)
    }
}

/// One managed plugin.
///
/// Install, update and uninstall of the same plugin are serialized by an
/// internal operation lock; the load sequence runs at most once to success.
pub struct Plugin {
    spec: PluginSpec,
    info: PluginInfo,
    state: RwLock<PluginState>,
    dependencies: Vec<Arc<Plugin>>,
    loaded: OnceCell<()>,
    op_lock: Mutex<()>,
    eager: AtomicBool,
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("url", &self.info.url)
            .field("dst", &self.info.dst)
            .field("state", &self.state())
            .field(
                "dependencies",
                &self
                    .dependencies
                    .iter()
                    .map(|d| d.url())
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Plugin {
    pub fn new(spec: PluginSpec, info: PluginInfo, dependencies: Vec<Arc<Plugin>>) -> Self {
        Self {
            spec,
            info,
            state: RwLock::new(PluginState::Added),
            dependencies,
            loaded: OnceCell::new(),
            op_lock: Mutex::new(()),
            eager: AtomicBool::new(false),
        }
    }

    pub fn url(&self) -> &str {
        &self.info.url
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn dst(&self) -> &Path {
        &self.info.dst
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn spec(&self) -> &PluginSpec {
        &self.spec
    }

    pub fn dependencies(&self) -> &[Arc<Plugin>] {
        &self.dependencies
    }

    pub fn is_lazy(&self) -> bool {
        self.spec.is_lazy()
    }

    /// Whether the load sequence has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub fn state(&self) -> PluginState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves to `next` if the state machine allows it.
    fn advance(&self, next: PluginState, operation: &'static str) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == next {
            return Ok(());
        }
        if !state.can_transition_to(next) {
            return Err(Error::InvalidState {
                url: self.info.url.clone(),
                state: *state,
                operation,
            });
        }
        tracing::trace!(url = %self.info.url, from = %*state, to = %next, "State transition");
        *state = next;
        Ok(())
    }

    /// Added plugins become Disabled; returns `false` if the plugin had
    /// already moved on.
    pub(crate) fn mark_disabled(&self) -> bool {
        self.advance(PluginState::Disabled, "disable").is_ok()
    }

    /// Loaded at add time rather than by a trigger.
    pub(crate) fn mark_eager(&self) {
        self.eager.store(true, Ordering::Release);
    }

    pub fn is_eager(&self) -> bool {
        self.eager.load(Ordering::Acquire)
    }

    fn hook_context<'a>(&'a self, ctx: &'a LifecycleContext) -> HookContext<'a> {
        HookContext {
            url: &self.info.url,
            name: &self.info.name,
            dst: &self.info.dst,
            host: ctx.host.as_ref(),
        }
    }

    /// Clones the plugin unless its destination already exists, then runs
    /// the build step.
    pub async fn install(&self, ctx: &LifecycleContext) -> Result<InstallOutcome> {
        if self.state() == PluginState::Disabled {
            return Ok(InstallOutcome::Skipped);
        }

        let _op = self.op_lock.lock().await;
        let span = spans::install_span(&self.info.url);
        let result = self.install_locked(ctx).instrument(span.span().clone()).await;
        span.finish(result.is_ok());
        result
    }

    async fn install_locked(&self, ctx: &LifecycleContext) -> Result<InstallOutcome> {
        let state = self.state();
        let dst = &self.info.dst;

        if tokio::fs::try_exists(dst).await? {
            return match state {
                PluginState::BuildFailed => {
                    self.advance(PluginState::Installing, "install")?;
                    let _permit = ctx.controller.acquire().await;
                    self.finish_build(ctx).await?;
                    Ok(InstallOutcome::Rebuilt)
                }
                PluginState::Added | PluginState::InstallFailed => {
                    self.advance(PluginState::Installed, "install")?;
                    tracing::debug!(url = %self.info.url, "Already installed");
                    Ok(InstallOutcome::AlreadyInstalled)
                }
                _ => Ok(InstallOutcome::AlreadyInstalled),
            };
        }

        let fresh = matches!(
            state,
            PluginState::Added | PluginState::InstallFailed | PluginState::BuildFailed
        );
        if fresh {
            self.advance(PluginState::Installing, "install")?;
        } else {
            tracing::warn!(
                url = %self.info.url,
                dst = %dst.display(),
                state = %state,
                "Destination disappeared, cloning again"
            );
        }

        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let request = CloneRequest::new(&self.info.url, dst)
            .branch(self.info.branch.clone())
            .depth(self.spec.depth.or(ctx.config.clone_depth));

        let _permit = ctx.controller.acquire().await;
        tracing::debug!(url = %self.info.url, vcs = ctx.vcs.name(), "Cloning");
        let cloned = ctx.vcs.clone_repo(&request).await;
        ctx.metrics.record_clone(cloned.is_ok());

        if let Err(source) = cloned {
            if fresh {
                self.advance(PluginState::InstallFailed, "install")?;
            }
            self.remove_partial_clone().await;
            tracing::warn!(url = %self.info.url, error = %source, "Install failed");
            return Err(Error::InstallFailure {
                url: self.info.url.clone(),
                source,
            });
        }

        tracing::info!(url = %self.info.url, dst = %dst.display(), "Installed");

        if fresh {
            self.finish_build(ctx).await?;
        } else if let Err(e) = self.build(ctx).await {
            ctx.metrics.record_hook_failure();
            tracing::warn!(url = %self.info.url, error = %e, "Build failed after re-clone");
        }
        Ok(InstallOutcome::Cloned)
    }

    /// Runs the build step from `Installing` and records the outcome.
    async fn finish_build(&self, ctx: &LifecycleContext) -> Result<()> {
        match self.build(ctx).await {
            Ok(()) => self.advance(PluginState::Installed, "install"),
            Err(e) => {
                ctx.metrics.record_hook_failure();
                tracing::warn!(url = %self.info.url, error = %e, "Build hook failed");
                self.advance(PluginState::BuildFailed, "install")?;
                Err(e)
            }
        }
    }

    async fn remove_partial_clone(&self) {
        let dst = &self.info.dst;
        if let Ok(true) = tokio::fs::try_exists(dst).await
            && let Err(e) = tokio::fs::remove_dir_all(dst).await
        {
            tracing::warn!(dst = %dst.display(), error = %e, "Failed to remove partial clone");
        }
    }

    /// User `build` hook, or help-tag generation for `doc/` when none is set.
    async fn build(&self, ctx: &LifecycleContext) -> Result<()> {
        if let Some(hook) = &self.spec.build {
            tracing::debug!(url = %self.info.url, "Running build hook");
            return hook.run(HookKind::Build, &self.hook_context(ctx)).await;
        }

        let doc = self.info.dst.join("doc");
        if tokio::fs::try_exists(&doc).await.unwrap_or(false)
            && let Err(e) = ctx.host.generate_help_tags(&doc).await
        {
            tracing::warn!(url = %self.info.url, error = %e, "Help tag generation failed");
        }
        Ok(())
    }

    /// Runs the `before` or `after` hook. Failures are logged, never returned.
    pub async fn run_hook(&self, kind: HookKind, ctx: &LifecycleContext) {
        let hook = match kind {
            HookKind::Before => self.spec.before.as_ref(),
            HookKind::After => self.spec.after.as_ref(),
            HookKind::Build => self.spec.build.as_ref(),
        };
        let Some(hook) = hook else {
            return;
        };
        if let Err(e) = hook.run(kind, &self.hook_context(ctx)).await {
            ctx.metrics.record_hook_failure();
            tracing::warn!(url = %self.info.url, hook = %kind, error = %e, "Hook failed");
        }
    }

    /// Puts the plugin on the search path and sources its startup scripts.
    pub async fn register(&self, ctx: &LifecycleContext) -> Result<()> {
        match self.state() {
            PluginState::Registered | PluginState::Loaded => return Ok(()),
            PluginState::Installed => {}
            state => {
                return Err(Error::InvalidState {
                    url: self.info.url.clone(),
                    state,
                    operation: "register",
                });
            }
        }

        self.advance(PluginState::Registering, "register")?;
        match self.register_scripts(ctx).await {
            Ok(()) => self.advance(PluginState::Registered, "register"),
            Err(e) => {
                self.advance(PluginState::Installed, "register")?;
                Err(e)
            }
        }
    }

    async fn register_scripts(&self, ctx: &LifecycleContext) -> Result<()> {
        let dst = &self.info.dst;
        {
            let mut path = ctx.controller.lock_search_path().await;
            if path.insert(dst.clone()) {
                let pushed = ctx.host.set_search_path(path.entries()).await;
                if let Err(e) = pushed {
                    path.remove(dst);
                    return Err(e);
                }
            }
        }

        let _permit = ctx.controller.acquire().await;
        for script in scripts::discover(dst, STARTUP_SCRIPTS).await? {
            tracing::trace!(script = %script.display(), "Sourcing");
            ctx.host.source(&script).await?;
        }
        for (name, script) in scripts::sub_plugins(dst).await? {
            tracing::debug!(url = %self.info.url, sub_plugin = %name, "Loading sub-plugin");
            ctx.host.load_sub_plugin(&name, &script).await?;
        }
        tracing::debug!(url = %self.info.url, "Registered");
        Ok(())
    }

    /// Loads dependencies, then this plugin, once.
    ///
    /// Concurrent callers wait for the same load. Returns `true` only for the
    /// call that performed it; disabled plugins return `false`. A failed load
    /// can be retried, but a dependency that already ended in InstallFailed or
    /// BuildFailed is not retried from here and fails the load with
    /// [`Error::DependencyFailed`].
    pub fn ensure_loaded<'a>(&'a self, ctx: &'a LifecycleContext) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            for dependency in &self.dependencies {
                let state = dependency.state();
                if state.is_failed() {
                    return Err(Error::DependencyFailed {
                        url: self.info.url.clone(),
                        dependency: dependency.url().to_string(),
                        state,
                    });
                }
                dependency.ensure_loaded(ctx).await?;
            }
            if self.state() == PluginState::Disabled {
                return Ok(false);
            }

            let performed = AtomicBool::new(false);
            let flag = &performed;
            self.loaded
                .get_or_try_init(|| async move {
                    flag.store(true, Ordering::Release);
                    self.load(ctx).await
                })
                .await?;
            Ok(performed.load(Ordering::Acquire))
        })
    }

    async fn load(&self, ctx: &LifecycleContext) -> Result<()> {
        self.install(ctx).await?;
        self.run_hook(HookKind::Before, ctx).await;
        self.register(ctx).await?;
        self.run_hook(HookKind::After, ctx).await;
        Ok(())
    }

    /// Sources `after/plugin` scripts of a registered plugin and marks it
    /// Loaded. Returns `false` if the plugin was not in `Registered`.
    pub async fn source_after(&self, ctx: &LifecycleContext) -> Result<bool> {
        let _op = self.op_lock.lock().await;
        if self.state() != PluginState::Registered {
            return Ok(false);
        }

        let _permit = ctx.controller.acquire().await;
        for script in scripts::discover(&self.info.dst, AFTER_SCRIPTS).await? {
            ctx.host.source(&script).await?;
        }
        self.advance(PluginState::Loaded, "source after scripts of")?;
        Ok(true)
    }

    /// Pulls the plugin, cloning it first if its destination is missing.
    pub async fn update(&self, ctx: &LifecycleContext) -> Result<UpdateOutcome> {
        if self.state() == PluginState::Disabled {
            return Ok(UpdateOutcome::without_revisions(
                &self.info.url,
                UpdateStatus::Skipped,
            ));
        }

        if !tokio::fs::try_exists(&self.info.dst).await? {
            let status = match self.install(ctx).await? {
                InstallOutcome::Cloned => UpdateStatus::Installed,
                InstallOutcome::Skipped => UpdateStatus::Skipped,
                InstallOutcome::AlreadyInstalled | InstallOutcome::Rebuilt => {
                    UpdateStatus::UpToDate
                }
            };
            return Ok(UpdateOutcome::without_revisions(&self.info.url, status));
        }

        let _op = self.op_lock.lock().await;
        let span = spans::update_span(&self.info.url);
        let result = self.update_locked(ctx).instrument(span.span().clone()).await;
        span.finish(result.is_ok());
        result
    }

    async fn update_locked(&self, ctx: &LifecycleContext) -> Result<UpdateOutcome> {
        let dst = &self.info.dst;
        let _permit = ctx.controller.acquire().await;

        let pulled = self.pull(ctx).await;
        ctx.metrics.record_pull(pulled.is_ok());
        let (from, to) = pulled.map_err(|source| {
            tracing::warn!(url = %self.info.url, error = %source, "Update failed");
            Error::UpdateFailure {
                url: self.info.url.clone(),
                source,
            }
        })?;

        if from == to {
            tracing::debug!(url = %self.info.url, revision = %to, "Up to date");
            return Ok(UpdateOutcome {
                url: self.info.url.clone(),
                status: UpdateStatus::UpToDate,
                from: Some(from),
                to: Some(to),
                commits: Vec::new(),
            });
        }

        let commits = if ctx.config.log_updates {
            ctx.vcs.log(dst, &from, &to).await.unwrap_or_else(|e| {
                tracing::debug!(url = %self.info.url, error = %e, "Could not read update log");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        match self.build(ctx).await {
            Ok(()) if self.state() == PluginState::BuildFailed => {
                self.advance(PluginState::Installed, "rebuild")?;
                tracing::info!(url = %self.info.url, "Build recovered after update");
            }
            Ok(()) => {}
            Err(e) => {
                ctx.metrics.record_hook_failure();
                tracing::warn!(url = %self.info.url, error = %e, "Build failed after update");
            }
        }

        tracing::info!(
            url = %self.info.url,
            from = %from,
            to = %to,
            commits = commits.len(),
            "Updated"
        );
        Ok(UpdateOutcome {
            url: self.info.url.clone(),
            status: UpdateStatus::Updated,
            from: Some(from),
            to: Some(to),
            commits,
        })
    }

    /// Checks out the configured branch if needed and pulls. Returns the
    /// revisions before and after.
    async fn pull(&self, ctx: &LifecycleContext) -> std::result::Result<(String, String), VcsError> {
        let dst = &self.info.dst;
        if let Some(branch) = &self.info.branch {
            let current = ctx.vcs.current_branch(dst).await?;
            if &current != branch {
                tracing::debug!(url = %self.info.url, from = %current, to = %branch, "Switching branch");
                ctx.vcs.checkout(dst, branch).await?;
            }
        }
        let from = ctx.vcs.revision(dst).await?;
        ctx.vcs.pull(dst).await?;
        let to = ctx.vcs.revision(dst).await?;
        Ok((from, to))
    }

    /// Drops the search-path entry and deletes the destination directory.
    pub async fn uninstall(&self, ctx: &LifecycleContext) -> Result<()> {
        let _op = self.op_lock.lock().await;
        let dst = &self.info.dst;
        {
            let mut path = ctx.controller.lock_search_path().await;
            if path.remove(dst) {
                ctx.host.set_search_path(path.entries()).await?;
            }
        }
        if tokio::fs::try_exists(dst).await? {
            tokio::fs::remove_dir_all(dst).await?;
        }
        tracing::info!(url = %self.info.url, dst = %dst.display(), "Uninstalled");
        Ok(())
    }

    /// This plugin and its transitive dependencies, dependencies first.
    pub fn dependency_closure(self: &Arc<Self>) -> Vec<Arc<Plugin>> {
        fn visit(plugin: &Arc<Plugin>, out: &mut Vec<Arc<Plugin>>) {
            if out.iter().any(|p| p.url() == plugin.url()) {
                return;
            }
            for dependency in &plugin.dependencies {
                visit(dependency, out);
            }
            out.push(plugin.clone());
        }

        let mut out = Vec::new();
        visit(self, &mut out);
        out
    }
}
