//! Script discovery inside a plugin directory.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub(crate) const STARTUP_SCRIPTS: &[&str] = &["plugin/**/*.vim", "plugin/**/*.lua"];
pub(crate) const AFTER_SCRIPTS: &[&str] = &["after/plugin/**/*.vim", "after/plugin/**/*.lua"];
const SUB_PLUGIN_ENTRIES: &[&str] = &["denops/*/main.ts", "denops/*/main.js"];

/// Files under `root` matching any of `patterns`, deduplicated.
pub(crate) async fn discover(root: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>> {
    let escaped = glob::Pattern::escape(&root.to_string_lossy());
    let escaped = escaped.trim_end_matches('/');
    let patterns: Vec<String> = patterns
        .iter()
        .map(|p| format!("{}/{}", escaped, p))
        .collect();

    tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for pattern in &patterns {
            for path in glob::glob(pattern)?.filter_map(|r| r.ok()) {
                if path.is_file() && !found.contains(&path) {
                    found.push(path);
                }
            }
        }
        Ok(found)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

/// `(name, entry point)` of each embedded sub-plugin; `main.ts` wins over
/// `main.js` for the same name.
pub(crate) async fn sub_plugins(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut plugins: Vec<(String, PathBuf)> = Vec::new();
    for script in discover(root, SUB_PLUGIN_ENTRIES).await? {
        let Some(name) = script
            .parent()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
        else {
            continue;
        };
        if !plugins.iter().any(|(n, _)| *n == name) {
            plugins.push((name, script));
        }
    }
    Ok(plugins)
}
