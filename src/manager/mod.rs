//! Plugin registry and dispatch surface.

mod graph;
mod report;

pub use graph::{DependencyGraph, GraphNode};
pub use report::{BatchFailure, BatchOperation, BatchReport, PluginSummary};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{Instrument, instrument};

use crate::config::ManagerConfig;
use crate::host::{Host, NotifyLevel};
use crate::lazy::{LazyIndex, Trigger, TriggerBinding, TriggerKind};
use crate::observability::{MetricsSummary, spans};
use crate::plugin::{
    InstallOutcome, LifecycleContext, Plugin, PluginState, UpdateOutcome, UpdateStatus,
    canonical_url,
};
use crate::sync::SearchPath;
use crate::vcs::{GitCli, VersionControl};
use crate::{Error, PluginSpec, Result};

/// Builder for [`Manager`].
pub struct ManagerBuilder {
    host: Arc<dyn Host>,
    config: ManagerConfig,
    vcs: Option<Arc<dyn VersionControl>>,
}

impl ManagerBuilder {
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Version-control backend; defaults to [`GitCli`].
    pub fn vcs(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    pub fn build(self) -> Result<Manager> {
        self.config.validate()?;
        let vcs = self.vcs.unwrap_or_else(|| Arc::new(GitCli::new()));
        let ctx = LifecycleContext::new(self.host, self.config).with_vcs(vcs);
        Ok(Manager {
            ctx,
            registry: RwLock::new(Vec::new()),
            index: DashMap::new(),
            lazy: LazyIndex::new(),
            ended: AtomicBool::new(false),
        })
    }
}

/// Owns every plugin of one editor session.
///
/// Plugins are kept in the order they were admitted, dependencies before
/// dependents, and are unique by canonical URL.
pub struct Manager {
    ctx: LifecycleContext,
    registry: RwLock<Vec<Arc<Plugin>>>,
    index: DashMap<String, Arc<Plugin>>,
    lazy: LazyIndex,
    ended: AtomicBool,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("ctx", &self.ctx)
            .field("plugins", &self.index.len())
            .field("ended", &self.is_ended())
            .finish_non_exhaustive()
    }
}

impl Manager {
    pub fn builder(host: Arc<dyn Host>) -> ManagerBuilder {
        ManagerBuilder {
            host,
            config: ManagerConfig::default(),
            vcs: None,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.ctx.config
    }

    pub fn context(&self) -> &LifecycleContext {
        &self.ctx
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.ctx.metrics.snapshot(self.ctx.controller.peak())
    }

    /// Adds a plugin and its dependencies.
    ///
    /// The whole dependency tree is resolved and every `enabled` evaluated
    /// before anything is installed. Eager plugins are then installed and
    /// registered dependencies first; lazy plugins only get their placeholder
    /// triggers. Member failures are reported and do not fail the call; only
    /// an invalid tree (bad URL, cycle) or a finalized manager does.
    #[instrument(skip_all, fields(url = %spec.url))]
    pub async fn add(&self, spec: PluginSpec) -> Result<Arc<Plugin>> {
        if self.is_ended() {
            return Err(Error::Finalized { url: spec.url });
        }

        let graph = DependencyGraph::build(&spec, &self.ctx.config)?;
        let enabled = self.evaluate_enabled(&graph).await;

        let mut admitted: Vec<Option<Arc<Plugin>>> = vec![None; graph.len()];
        let mut root = None;
        for idx in graph.install_order() {
            let node = &graph.nodes()[idx];
            let dependencies = node
                .children
                .iter()
                .filter_map(|&c| admitted[c].clone())
                .collect();
            let plugin = self.admit(node, dependencies, enabled[idx]).await;
            if idx == 0 {
                root = Some(plugin.clone());
            }
            admitted[idx] = Some(plugin);
        }

        root.ok_or(Error::NotFound { url: spec.url })
    }

    /// Adds each spec in order. Invalid specs are reported and skipped.
    pub async fn add_all<I>(&self, specs: I) -> Result<Vec<Arc<Plugin>>>
    where
        I: IntoIterator<Item = PluginSpec>,
    {
        let mut added = Vec::new();
        for spec in specs {
            let url = spec.url.clone();
            match self.add(spec).await {
                Ok(plugin) => added.push(plugin),
                Err(e @ Error::Finalized { .. }) => return Err(e),
                Err(e) => self.report_failure(&url, &e).await,
            }
        }
        Ok(added)
    }

    /// Parents before children; unset values inherit the parent's result.
    async fn evaluate_enabled(&self, graph: &DependencyGraph) -> Vec<bool> {
        let mut values = vec![true; graph.len()];
        for (idx, node) in graph.nodes().iter().enumerate() {
            let inherited = node.parent.map(|p| values[p]).unwrap_or(true);
            let mut value = match &node.spec.enabled {
                None => inherited,
                Some(enabled) => match enabled.evaluate(self.ctx.host.as_ref()).await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!(url = %node.info.url, error = %e, "Could not evaluate enabled, disabling");
                        false
                    }
                },
            };
            if value
                && !node.spec.profiles.is_empty()
                && !node
                    .spec
                    .profiles
                    .iter()
                    .any(|p| self.ctx.config.is_profile_active(p))
            {
                tracing::debug!(url = %node.info.url, profiles = ?node.spec.profiles, "No active profile");
                value = false;
            }
            values[idx] = value;
        }
        values
    }

    async fn admit(
        &self,
        node: &GraphNode,
        dependencies: Vec<Arc<Plugin>>,
        enabled: bool,
    ) -> Arc<Plugin> {
        let eager = !node.deferred && !node.spec.is_lazy();

        let (plugin, created) = match self.index.entry(node.info.url.clone()) {
            Entry::Occupied(e) => (e.get().clone(), false),
            Entry::Vacant(v) => {
                let plugin = Arc::new(Plugin::new(
                    node.spec.clone(),
                    node.info.clone(),
                    dependencies,
                ));
                v.insert(plugin.clone());
                (plugin, true)
            }
        };

        if !created {
            tracing::debug!(url = %plugin.url(), "Already added");
            if eager && enabled && plugin.state() != PluginState::Disabled && !plugin.is_eager() {
                plugin.mark_eager();
                if let Err(e) = self.activate(&plugin, false).await {
                    self.report_failure(plugin.url(), &e).await;
                }
            }
            return plugin;
        }

        if !enabled {
            plugin.mark_disabled();
            tracing::debug!(url = %plugin.url(), "Disabled");
        } else if node.spec.is_lazy() {
            self.arm(&plugin).await;
        } else if node.deferred {
            tracing::debug!(url = %plugin.url(), "Deferred until a dependent loads");
        } else {
            plugin.mark_eager();
            if let Err(e) = self.activate(&plugin, false).await {
                self.report_failure(plugin.url(), &e).await;
            }
        }

        self.registry.write().await.push(plugin.clone());
        plugin
    }

    /// Defines the placeholder triggers of a lazy plugin.
    async fn arm(&self, plugin: &Plugin) {
        let Some(lazy) = &plugin.spec().lazy else {
            return;
        };
        let bindings = TriggerBinding::bindings_for(plugin.url(), lazy);
        self.lazy.arm(plugin.url(), bindings.clone());
        self.define_bindings(&bindings).await;
        tracing::debug!(url = %plugin.url(), triggers = bindings.len(), "Armed lazy triggers");
    }

    async fn define_bindings(&self, bindings: &[TriggerBinding]) {
        for binding in bindings {
            if let Err(e) = self.ctx.host.define_trigger(binding).await {
                tracing::warn!(url = %binding.url(), error = %e, "Failed to define trigger");
            }
        }
        self.ctx.metrics.armed_triggers.add(bindings.len() as i64);
    }

    async fn remove_bindings(&self, bindings: &[TriggerBinding]) {
        for binding in bindings {
            if let Err(e) = self.ctx.host.remove_trigger(binding).await {
                tracing::warn!(url = %binding.url(), error = %e, "Failed to remove trigger");
            }
        }
        self.ctx.metrics.armed_triggers.add(-(bindings.len() as i64));
    }

    /// Disarms the triggers of `plugin` and its dependencies and loads them.
    ///
    /// Returns `true` if this call performed the load. If the load fails the
    /// triggers this call removed are defined again.
    async fn activate(&self, plugin: &Arc<Plugin>, source_after: bool) -> Result<bool> {
        let closure = plugin.dependency_closure();
        let disarmed = self.disarm_closure(&closure).await;

        match plugin.ensure_loaded(&self.ctx).await {
            Ok(performed) => {
                // A concurrent caller whose attempt failed may have re-armed.
                self.disarm_closure(&closure).await;
                if source_after {
                    for member in &closure {
                        if let Err(e) = member.source_after(&self.ctx).await {
                            self.report_failure(member.url(), &e).await;
                        }
                    }
                }
                Ok(performed)
            }
            Err(e) => {
                if !plugin.is_loaded() {
                    for (url, bindings) in disarmed {
                        self.define_bindings(&bindings).await;
                        self.lazy.rearm(&url, bindings);
                    }
                    // Another caller's retry can finish while we re-arm.
                    if plugin.is_loaded() {
                        self.disarm_closure(&closure).await;
                    }
                }
                Err(e)
            }
        }
    }

    async fn disarm_closure(&self, closure: &[Arc<Plugin>]) -> Vec<(String, Vec<TriggerBinding>)> {
        let mut disarmed = Vec::new();
        for member in closure {
            let bindings = self.lazy.disarm(member.url());
            if !bindings.is_empty() {
                self.remove_bindings(&bindings).await;
                disarmed.push((member.url().to_string(), bindings));
            }
        }
        disarmed
    }

    /// Loads a lazy plugin in response to `trigger` and replays the action.
    ///
    /// For key triggers returns the keys the host should feed back; command
    /// and autocommand triggers are re-issued through the host and return
    /// `None`. Concurrent calls for the same plugin load it once.
    #[instrument(skip_all, fields(url = %url, trigger = %trigger.kind()))]
    pub async fn load(&self, url: &str, trigger: Trigger) -> Result<Option<String>> {
        let plugin = self.find(url)?;
        self.load_plugin(&plugin, trigger.kind()).await?;
        self.replay(&plugin, &trigger).await
    }

    /// Like [`load`](Self::load), resolving the plugin from the trigger.
    ///
    /// Every plugin that declared the trigger is loaded; the replay uses the
    /// first one's declarations.
    pub async fn trigger(&self, trigger: Trigger) -> Result<Option<String>> {
        let owners = self.lazy.owners(&trigger);
        let Some(first) = owners.first() else {
            return Err(Error::NotFound {
                url: format!("<{} trigger>", trigger.kind()),
            });
        };
        let first = self.find(first)?;
        for url in &owners {
            let plugin = self.find(url)?;
            self.load_plugin(&plugin, trigger.kind()).await?;
        }
        self.replay(&first, &trigger).await
    }

    async fn load_plugin(&self, plugin: &Arc<Plugin>, kind: TriggerKind) -> Result<()> {
        let span = spans::load_span(plugin.url(), kind);
        let result = self
            .activate(plugin, true)
            .instrument(span.span().clone())
            .await;
        span.finish(result.is_ok());

        match result {
            Ok(true) => {
                self.ctx.metrics.record_lazy_load();
                tracing::info!(url = %plugin.url(), "Loaded on trigger");
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                self.report_failure(plugin.url(), &e).await;
                Err(e)
            }
        }
    }

    async fn replay(&self, plugin: &Plugin, trigger: &Trigger) -> Result<Option<String>> {
        let host = self.ctx.host.as_ref();
        match trigger {
            Trigger::Key { lhs, mode } => {
                let declared = plugin
                    .spec()
                    .lazy
                    .as_ref()
                    .and_then(|lazy| lazy.keys.iter().find(|k| k.lhs == *lhs));
                if let Some(rhs) = declared.and_then(|k| k.rhs.clone()) {
                    return Ok(Some(rhs));
                }
                let mode = mode
                    .clone()
                    .or_else(|| declared.and_then(|k| k.modes.first().cloned()))
                    .unwrap_or_else(|| "n".to_string());
                let mapped = host.find_mapping(&mode, lhs).await?;
                Ok(Some(mapped.unwrap_or_else(|| lhs.clone())))
            }
            Trigger::Command { name, args, bang } => {
                let line = format!("{}{} {}", name, if *bang { "!" } else { "" }, args);
                host.execute(line.trim_end()).await?;
                Ok(None)
            }
            Trigger::Autocmd { event } => {
                host.emit_event(event).await?;
                Ok(None)
            }
        }
    }

    /// Installs one plugin by URL, or every non-disabled plugin.
    ///
    /// With a URL the member's error is returned. Without one, failures are
    /// collected in the report.
    #[instrument(skip(self))]
    pub async fn install_all(&self, url: Option<&str>) -> Result<BatchReport> {
        let mut report = BatchReport::new(BatchOperation::Install);

        if let Some(url) = url {
            let plugin = self.find(url)?;
            self.install_one(&plugin).await?;
            report.succeeded.push(plugin.url().to_string());
            return Ok(report.finish());
        }

        let plugins = self.active_plugins().await;
        let results = join_all(plugins.iter().map(|p| self.install_one(p))).await;
        for (plugin, result) in plugins.iter().zip(results) {
            match result {
                Ok(_) => report.succeeded.push(plugin.url().to_string()),
                Err(e) => {
                    self.report_failure(plugin.url(), &e).await;
                    report.failures.push(BatchFailure::new(plugin.url(), &e));
                }
            }
        }

        let report = report.finish();
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "Install finished"
        );
        Ok(report)
    }

    async fn install_one(&self, plugin: &Arc<Plugin>) -> Result<InstallOutcome> {
        let outcome = plugin.install(&self.ctx).await?;
        self.resume_eager(plugin).await?;
        Ok(outcome)
    }

    /// Finishes loading an eager plugin whose earlier load failed.
    async fn resume_eager(&self, plugin: &Arc<Plugin>) -> Result<()> {
        if plugin.is_eager() && !plugin.is_loaded() {
            self.activate(plugin, self.is_ended()).await?;
        }
        Ok(())
    }

    /// Updates one plugin by URL, or every non-disabled plugin.
    #[instrument(skip(self))]
    pub async fn update_all(&self, url: Option<&str>) -> Result<BatchReport> {
        let mut report = BatchReport::new(BatchOperation::Update);

        if let Some(url) = url {
            let plugin = self.find(url)?;
            let outcome = self.update_one(&plugin).await?;
            report.succeeded.push(plugin.url().to_string());
            report.updates.push(outcome);
            let report = report.finish();
            self.notify_updates(&report).await;
            return Ok(report);
        }

        let plugins = self.active_plugins().await;
        let results = join_all(plugins.iter().map(|p| self.update_one(p))).await;
        for (plugin, result) in plugins.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    report.succeeded.push(plugin.url().to_string());
                    report.updates.push(outcome);
                }
                Err(e) => {
                    self.report_failure(plugin.url(), &e).await;
                    report.failures.push(BatchFailure::new(plugin.url(), &e));
                }
            }
        }

        let report = report.finish();
        tracing::info!(
            succeeded = report.succeeded.len(),
            changed = report.changed().len(),
            failed = report.failures.len(),
            "Update finished"
        );
        self.notify_updates(&report).await;
        Ok(report)
    }

    async fn update_one(&self, plugin: &Arc<Plugin>) -> Result<UpdateOutcome> {
        let outcome = plugin.update(&self.ctx).await?;
        // Fresh clones and rebuilt plugins both come back as Installed.
        if outcome.status == UpdateStatus::Installed || plugin.state() == PluginState::Installed {
            self.resume_eager(plugin).await?;
        }
        Ok(outcome)
    }

    async fn notify_updates(&self, report: &BatchReport) {
        if !self.ctx.config.notify {
            return;
        }
        for update in report.changed() {
            let message = match (&update.from, &update.to) {
                (Some(from), Some(to)) => format!(
                    "Updated {} ({}..{}, {} commits)",
                    update.url,
                    short_rev(from),
                    short_rev(to),
                    update.commits.len()
                ),
                _ => format!("Installed {}", update.url),
            };
            if let Err(e) = self.ctx.host.notify(NotifyLevel::Info, &message).await {
                tracing::debug!(error = %e, "Host notification failed");
            }
        }
    }

    /// Sources `after/plugin` scripts of every registered plugin, then
    /// finalizes the host. Later `add` calls fail with [`Error::Finalized`].
    #[instrument(skip_all)]
    pub async fn end(&self) -> Result<()> {
        if self.is_ended() {
            return Ok(());
        }

        let plugins = self.plugins().await;
        let results = join_all(plugins.iter().map(|p| p.source_after(&self.ctx))).await;
        for (plugin, result) in plugins.iter().zip(results) {
            if let Err(e) = result {
                self.report_failure(plugin.url(), &e).await;
            }
        }

        self.ctx.host.finalize().await?;
        self.ended.store(true, Ordering::Release);
        tracing::debug!(plugins = plugins.len(), "Startup finished");
        Ok(())
    }

    /// Removes a plugin from the registry, the search path and disk.
    #[instrument(skip(self))]
    pub async fn uninstall(&self, url: &str) -> Result<()> {
        let plugin = self.find(url)?;
        plugin.uninstall(&self.ctx).await?;

        self.index.remove(plugin.url());
        self.registry
            .write()
            .await
            .retain(|p| !Arc::ptr_eq(p, &plugin));
        let bindings = self.lazy.forget(plugin.url());
        self.remove_bindings(&bindings).await;
        Ok(())
    }

    pub async fn list(&self) -> Vec<PluginSummary> {
        self.registry
            .read()
            .await
            .iter()
            .map(|p| PluginSummary::from(p.as_ref()))
            .collect()
    }

    pub async fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.registry.read().await.clone()
    }

    /// Looks a plugin up by any spelling of its URL.
    pub fn plugin(&self, url: &str) -> Option<Arc<Plugin>> {
        let key = canonical_url(url, &self.ctx.config.default_host).ok()?;
        self.index.get(&key).map(|p| p.value().clone())
    }

    pub async fn search_path(&self) -> SearchPath {
        self.ctx.controller.search_path().await
    }

    /// Placeholder triggers still armed for `url`.
    pub fn armed_triggers(&self, url: &str) -> Vec<TriggerBinding> {
        self.plugin(url)
            .map(|p| self.lazy.bindings(p.url()))
            .unwrap_or_default()
    }

    fn find(&self, url: &str) -> Result<Arc<Plugin>> {
        self.plugin(url).ok_or_else(|| Error::NotFound {
            url: url.to_string(),
        })
    }

    async fn active_plugins(&self) -> Vec<Arc<Plugin>> {
        self.registry
            .read()
            .await
            .iter()
            .filter(|p| p.state() != PluginState::Disabled)
            .cloned()
            .collect()
    }

    async fn report_failure(&self, url: &str, error: &Error) {
        tracing::warn!(url = %url, error = %error, category = ?error.category(), "Plugin operation failed");
        if self.ctx.config.notify
            && let Err(e) = self
                .ctx
                .host
                .notify(NotifyLevel::Error, &error.to_string())
                .await
        {
            tracing::debug!(error = %e, "Host notification failed");
        }
    }
}

fn short_rev(rev: &str) -> &str {
    rev.get(..7).unwrap_or(rev)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_rev() {
        assert_eq!(short_rev("0123456789abcdef"), "0123456");
        assert_eq!(short_rev("abc"), "abc");
    }

    #[test]
    fn test_builder_validates_config() {
        let host: Arc<dyn Host> = Arc::new(crate::host::MemoryHost::new());
        let result = Manager::builder(host)
            .config(ManagerConfig::new("/tmp/p").with_concurrency(0))
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_unknown_url_is_not_found() {
        let host: Arc<dyn Host> = Arc::new(crate::host::MemoryHost::new());
        let manager = Manager::builder(host)
            .config(ManagerConfig::new("/tmp/lazyplug-unit"))
            .build()
            .unwrap();

        assert!(manager.load("a/b", Trigger::key("x")).await.unwrap_err().is_not_found());
        assert!(manager.update_all(Some("a/b")).await.unwrap_err().is_not_found());
        assert!(manager.trigger(Trigger::command("Nope")).await.unwrap_err().is_not_found());
        assert!(manager.list().await.is_empty());
    }
}
