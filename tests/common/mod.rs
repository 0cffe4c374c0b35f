//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lazyplug::{CloneRequest, Manager, ManagerConfig, MemoryHost, VcsError, VersionControl};
use tempfile::TempDir;

/// Version control double.
///
/// A clone creates the destination with `plugin/<repo>.vim` plus any files
/// registered with [`FakeVcs::fixture`]. Revisions are `rev<N>`; `publish`
/// makes the next pull of that destination move one revision ahead.
#[derive(Default)]
pub struct FakeVcs {
    pub clones: AtomicUsize,
    pub pulls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    failing_clones: Mutex<HashSet<String>>,
    failing_once: Mutex<HashSet<String>>,
    failing_pulls: Mutex<HashSet<PathBuf>>,
    fixtures: Mutex<HashMap<String, Vec<(String, String)>>>,
    local: Mutex<HashMap<PathBuf, u32>>,
    remote: Mutex<HashMap<PathBuf, u32>>,
    branches: Mutex<HashMap<PathBuf, String>>,
    events: Mutex<Vec<String>>,
}

impl FakeVcs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `url` is the canonical URL, e.g. `https://github.com/a/b`.
    pub fn fail_clone(&self, url: &str) {
        self.failing_clones.lock().unwrap().insert(url.to_string());
    }

    /// Fails only the next clone of `url`.
    pub fn fail_clone_once(&self, url: &str) {
        self.failing_once.lock().unwrap().insert(url.to_string());
    }

    pub fn succeed_clone(&self, url: &str) {
        self.failing_clones.lock().unwrap().remove(url);
    }

    pub fn fail_pull(&self, dst: &Path) {
        self.failing_pulls.lock().unwrap().insert(dst.to_path_buf());
    }

    /// Writes `rel` with `content` into every clone of `url`.
    pub fn fixture(&self, url: &str, rel: &str, content: &str) {
        self.fixtures
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push((rel.to_string(), content.to_string()));
    }

    /// Pushes a new commit to the "remote" of `dst`.
    pub fn publish(&self, dst: &Path) {
        *self
            .remote
            .lock()
            .unwrap()
            .entry(dst.to_path_buf())
            .or_insert(1) += 1;
    }

    pub fn set_branch(&self, dst: &Path, branch: &str) {
        self.branches
            .lock()
            .unwrap()
            .insert(dst.to_path_buf(), branch.to_string());
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn clone_count(&self) -> usize {
        self.clones.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Clone events in order, by URL.
    pub fn cloned_urls(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("clone ").map(String::from))
            .collect()
    }

    async fn enter(&self) -> InFlight<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    fn name(&self) -> &str {
        "fake"
    }

    async fn clone_repo(&self, request: &CloneRequest) -> Result<(), VcsError> {
        let _in_flight = self.enter().await;
        self.clones.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("clone {}", request.url));

        let once = self.failing_once.lock().unwrap().remove(&request.url);
        if once || self.failing_clones.lock().unwrap().contains(&request.url) {
            return Err(VcsError::Exit {
                command: format!("git clone {}", request.url),
                code: Some(128),
                stderr: "fatal: repository not found".into(),
            });
        }

        let repo = request.url.rsplit('/').next().unwrap_or("plugin");
        let script = request.dst.join("plugin").join(format!("{}.vim", repo));
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, format!("\" {}\n", repo)).unwrap();

        let fixtures = self
            .fixtures
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_default();
        for (rel, content) in fixtures {
            let path = request.dst.join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        self.local.lock().unwrap().insert(request.dst.clone(), 1);
        self.remote
            .lock()
            .unwrap()
            .entry(request.dst.clone())
            .or_insert(1);
        self.set_branch(
            &request.dst,
            request.branch.as_deref().unwrap_or("main"),
        );
        Ok(())
    }

    async fn pull(&self, dst: &Path) -> Result<(), VcsError> {
        let _in_flight = self.enter().await;
        self.pulls.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(format!("pull {}", dst.display()));

        if self.failing_pulls.lock().unwrap().contains(dst) {
            return Err(VcsError::Exit {
                command: "git pull --ff-only --no-rebase".into(),
                code: Some(1),
                stderr: "fatal: Not possible to fast-forward, aborting.".into(),
            });
        }

        let remote = self.remote.lock().unwrap().get(dst).copied().unwrap_or(1);
        self.local.lock().unwrap().insert(dst.to_path_buf(), remote);
        Ok(())
    }

    async fn revision(&self, dst: &Path) -> Result<String, VcsError> {
        self.local
            .lock()
            .unwrap()
            .get(dst)
            .map(|n| format!("rev{}", n))
            .ok_or_else(|| VcsError::Other(format!("not a repository: {}", dst.display())))
    }

    async fn current_branch(&self, dst: &Path) -> Result<String, VcsError> {
        Ok(self
            .branches
            .lock()
            .unwrap()
            .get(dst)
            .cloned()
            .unwrap_or_else(|| "main".into()))
    }

    async fn checkout(&self, dst: &Path, branch: &str) -> Result<(), VcsError> {
        self.events
            .lock()
            .unwrap()
            .push(format!("checkout {} {}", dst.display(), branch));
        self.set_branch(dst, branch);
        Ok(())
    }

    async fn log(&self, _dst: &Path, from: &str, to: &str) -> Result<Vec<String>, VcsError> {
        Ok(vec![format!("{} after {}", to, from)])
    }
}

/// Manager wired to a [`MemoryHost`] and a [`FakeVcs`] under a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub host: Arc<MemoryHost>,
    pub vcs: Arc<FakeVcs>,
    pub manager: Manager,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(MemoryHost::new(), FakeVcs::new(), |c| c)
    }

    pub fn with_config(configure: impl FnOnce(ManagerConfig) -> ManagerConfig) -> Self {
        Self::build(MemoryHost::new(), FakeVcs::new(), configure)
    }

    pub fn build(
        host: MemoryHost,
        vcs: FakeVcs,
        configure: impl FnOnce(ManagerConfig) -> ManagerConfig,
    ) -> Self {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let host = Arc::new(host);
        let vcs = Arc::new(vcs);
        let manager = Manager::builder(host.clone())
            .config(configure(ManagerConfig::new(dir.path().join("plugins"))))
            .vcs(vcs.clone())
            .build()
            .unwrap();
        Self {
            dir,
            host,
            vcs,
            manager,
        }
    }

    pub fn base(&self) -> PathBuf {
        self.dir.path().join("plugins")
    }

    /// Destination of a `github.com` shorthand.
    pub fn dst(&self, shorthand: &str) -> PathBuf {
        self.base().join("github.com").join(shorthand)
    }
}

/// Logs go to the test writer; set `RUST_LOG=lazyplug=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn url(shorthand: &str) -> String {
    format!("https://github.com/{}", shorthand)
}
