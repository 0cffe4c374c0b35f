//! Identity and on-disk location derived from a spec.

use std::path::{Path, PathBuf};

use serde::Serialize;
use url::Url;

use super::spec::PluginSpec;
use crate::{Error, Result};

/// Immutable facts about a plugin, derived once from its spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    /// Canonical URL, the registry key.
    pub url: String,
    /// Repository name, used for logging and sub-plugin lookup.
    pub name: String,
    pub dst: PathBuf,
    pub branch: Option<String>,
}

impl PluginInfo {
    /// Resolves `spec` against the plugin root.
    ///
    /// Shorthand `owner/repo` gets `default_host`; `host.tld/owner/repo` and
    /// `http(s)` URLs keep their host. The destination is
    /// `<base>/<host>/<owner>/<repo>` unless the spec overrides it. Other URL
    /// forms (scp-style, `file://`, `ssh://`) need an explicit `dst`.
    pub fn resolve(spec: &PluginSpec, base: &Path, default_host: &str) -> Result<Self> {
        let raw = spec.url.trim();
        let branch = spec.branch.clone().filter(|b| !b.is_empty());

        match parse_location(raw, default_host) {
            Ok(location) => {
                let dst = spec.dst.clone().unwrap_or_else(|| {
                    let mut dst = base.join(&location.authority);
                    for segment in &location.segments {
                        dst.push(segment);
                    }
                    dst
                });
                Ok(Self {
                    url: location.url(),
                    name: location.name().to_string(),
                    dst,
                    branch,
                })
            }
            Err(Error::NotImplemented(_)) if spec.dst.is_some() => {
                let url = raw.trim_end_matches('/').to_string();
                let name = url
                    .rsplit(['/', ':'])
                    .next()
                    .map(|n| n.trim_end_matches(".git"))
                    .filter(|n| !n.is_empty())
                    .unwrap_or(url.as_str())
                    .to_string();
                Ok(Self {
                    dst: spec.dst.clone().unwrap_or_default(),
                    url,
                    name,
                    branch,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Canonical form used as the registry key.
///
/// `canonical_url("a/b", "github.com")` is `https://github.com/a/b`, the same
/// as for `https://github.com/a/b.git/`.
pub fn canonical_url(raw: &str, default_host: &str) -> Result<String> {
    match parse_location(raw.trim(), default_host) {
        Ok(location) => Ok(location.url()),
        Err(Error::NotImplemented(_)) => Ok(raw.trim().trim_end_matches('/').to_string()),
        Err(e) => Err(e),
    }
}

struct Location {
    scheme: String,
    authority: String,
    segments: Vec<String>,
}

impl Location {
    fn url(&self) -> String {
        format!(
            "{}://{}/{}",
            self.scheme,
            self.authority,
            self.segments.join("/")
        )
    }

    fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

fn invalid(url: &str, reason: impl Into<String>) -> Error {
    Error::InvalidSpec {
        url: url.to_string(),
        reason: reason.into(),
    }
}

fn parse_location(raw: &str, default_host: &str) -> Result<Location> {
    if raw.is_empty() {
        return Err(invalid(raw, "empty URL"));
    }

    if raw.starts_with("git@") {
        return Err(Error::NotImplemented(format!(
            "scp-style URL '{}' without an explicit dst",
            raw
        )));
    }

    if let Some((scheme, _)) = raw.split_once("://") {
        if !matches!(scheme, "http" | "https") {
            return Err(Error::NotImplemented(format!(
                "{}:// URL '{}' without an explicit dst",
                scheme, raw
            )));
        }
        return parse_http(raw);
    }

    let segments = split_segments(raw, raw)?;
    match segments.as_slice() {
        [_, _] => Ok(Location {
            scheme: "https".into(),
            authority: default_host.to_string(),
            segments,
        }),
        [host, rest @ ..] if rest.len() >= 2 && host.contains('.') => Ok(Location {
            scheme: "https".into(),
            authority: host.clone(),
            segments: rest.to_vec(),
        }),
        _ => Err(invalid(raw, "expected 'owner/repo' or 'host/owner/repo'")),
    }
}

fn parse_http(raw: &str) -> Result<Location> {
    let parsed = Url::parse(raw).map_err(|e| invalid(raw, e.to_string()))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid(raw, "URL has no host"))?;
    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let segments = split_segments(raw, parsed.path())?;
    if segments.len() < 2 {
        return Err(invalid(raw, "expected '<host>/<owner>/<repo>'"));
    }

    Ok(Location {
        scheme: parsed.scheme().to_string(),
        authority,
        segments,
    })
}

fn split_segments(raw: &str, path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(invalid(raw, format!("invalid path segment '{}'", segment)));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}
