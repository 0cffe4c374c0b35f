//! `git` command-line backend.

use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{CloneRequest, VcsError, VersionControl};

/// Runs the `git` executable found on `PATH` (or a configured program).
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub(crate) fn clone_args(request: &CloneRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["clone".into(), "--recurse-submodules".into()];
        if let Some(depth) = request.depth {
            args.push("--depth".into());
            args.push(depth.to_string().into());
        }
        if let Some(branch) = &request.branch {
            args.push("--branch".into());
            args.push(branch.into());
        }
        args.push("--".into());
        args.push(request.url.as_str().into());
        args.push(request.dst.as_os_str().to_owned());
        args
    }

    /// Runs git and returns trimmed stdout.
    async fn run<I, S>(&self, cwd: Option<&Path>, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args
            .into_iter()
            .map(|a| a.as_ref().to_owned())
            .collect();

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(program = %self.program, args = ?args, "Running git");

        let output = cmd.output().await.map_err(|source| VcsError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(VcsError::Exit {
                command: render_command(&self.program, &args),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn render_command(program: &str, args: &[OsString]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}

#[async_trait]
impl VersionControl for GitCli {
    fn name(&self) -> &str {
        "git"
    }

    async fn clone_repo(&self, request: &CloneRequest) -> Result<(), VcsError> {
        self.run(None, Self::clone_args(request)).await.map(|_| ())
    }

    async fn pull(&self, dst: &Path) -> Result<(), VcsError> {
        self.run(Some(dst), ["pull", "--ff-only", "--no-rebase"])
            .await
            .map(|_| ())
    }

    async fn revision(&self, dst: &Path) -> Result<String, VcsError> {
        self.run(Some(dst), ["rev-parse", "HEAD"]).await
    }

    async fn current_branch(&self, dst: &Path) -> Result<String, VcsError> {
        self.run(Some(dst), ["rev-parse", "--abbrev-ref", "HEAD"])
            .await
    }

    async fn checkout(&self, dst: &Path, branch: &str) -> Result<(), VcsError> {
        self.run(Some(dst), ["checkout", branch]).await.map(|_| ())
    }

    async fn log(&self, dst: &Path, from: &str, to: &str) -> Result<Vec<String>, VcsError> {
        let range = format!("{}..{}", from, to);
        let stdout = self
            .run(Some(dst), ["log", "--oneline", "--no-color", range.as_str()])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clone_args() {
        let request = CloneRequest::new("https://github.com/a/b", "/p/github.com/a/b")
            .branch(Some("dev".into()))
            .depth(Some(1));
        let args: Vec<String> = GitCli::clone_args(&request)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "clone",
                "--recurse-submodules",
                "--depth",
                "1",
                "--branch",
                "dev",
                "--",
                "https://github.com/a/b",
                "/p/github.com/a/b",
            ]
        );
    }

    #[test]
    fn test_render_command() {
        let args: Vec<OsString> = vec!["pull".into(), "--ff-only".into()];
        assert_eq!(render_command("git", &args), "git pull --ff-only");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempdir().unwrap();
        let git = GitCli::with_program("lazyplug-no-such-git-binary");
        let request = CloneRequest::new("https://example.invalid/a/b", dir.path().join("b"));

        let err = git.clone_repo(&request).await.unwrap_err();
        assert!(matches!(err, VcsError::Spawn { ref program, .. } if program == "lazyplug-no-such-git-binary"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_exit_error() {
        // `false` ignores its arguments and exits 1.
        let dir = tempdir().unwrap();
        let git = GitCli::with_program("false");

        let err = git.pull(dir.path()).await.unwrap_err();
        assert!(matches!(err, VcsError::Exit { code: Some(1), .. }));
    }
}
