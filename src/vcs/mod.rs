//! Version-control gateway.
//!
//! The lifecycle only talks to [`VersionControl`]; [`GitCli`] implements it by
//! shelling out to `git`.

mod git;

pub use git::GitCli;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Version-control failures.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// The process could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("`{command}` exited with {}: {stderr}", exit_code_label(*code))]
    Exit {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{0}")]
    Other(String),
}

fn exit_code_label(code: Option<i32>) -> String {
    code.map(|c| format!("status {}", c))
        .unwrap_or_else(|| "a signal".into())
}

/// Parameters for a fresh clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    pub url: String,
    pub dst: PathBuf,
    pub branch: Option<String>,
    pub depth: Option<u32>,
}

impl CloneRequest {
    pub fn new(url: impl Into<String>, dst: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            dst: dst.into(),
            branch: None,
            depth: None,
        }
    }

    pub fn branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn depth(mut self, depth: Option<u32>) -> Self {
        self.depth = depth.filter(|d| *d > 0);
        self
    }
}

/// Operations the lifecycle needs from a version-control backend.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Clones `request.url` into `request.dst`.
    async fn clone_repo(&self, request: &CloneRequest) -> Result<(), VcsError>;

    /// Fast-forward-only pull of the current branch.
    async fn pull(&self, dst: &Path) -> Result<(), VcsError>;

    /// Commit id of `HEAD`.
    async fn revision(&self, dst: &Path) -> Result<String, VcsError>;

    async fn current_branch(&self, dst: &Path) -> Result<String, VcsError>;

    async fn checkout(&self, dst: &Path, branch: &str) -> Result<(), VcsError>;

    /// One-line subjects of the commits in `from..to`, newest first.
    async fn log(&self, _dst: &Path, _from: &str, _to: &str) -> Result<Vec<String>, VcsError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_request_builder() {
        let request = CloneRequest::new("https://github.com/a/b", "/p/github.com/a/b")
            .branch(Some("main".into()))
            .depth(Some(0));
        assert_eq!(request.branch.as_deref(), Some("main"));
        assert_eq!(request.depth, None);

        let shallow = CloneRequest::new("u", "d").depth(Some(1));
        assert_eq!(shallow.depth, Some(1));
    }

    #[test]
    fn test_exit_error_display() {
        let err = VcsError::Exit {
            command: "git pull --ff-only".into(),
            code: Some(1),
            stderr: "not possible to fast-forward".into(),
        };
        assert_eq!(
            err.to_string(),
            "`git pull --ff-only` exited with status 1: not possible to fast-forward"
        );

        let killed = VcsError::Exit {
            command: "git clone".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(killed.to_string().contains("a signal"));
    }
}
