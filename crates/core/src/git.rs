//! Thin wrapper around the `git` command line.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Version control command runner.
#[async_trait]
pub trait Vcs: Send + Sync + fmt::Debug {
    /// Runs the VCS with `args` and returns its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Git`] with the captured output when the command fails.
    async fn run(&self, args: &[&str]) -> Result<String>;

    /// Runs the VCS and returns the [`clean`]ed first line of output.
    ///
    /// # Errors
    ///
    /// Same as [`Vcs::run`].
    async fn run_clean(&self, args: &[&str]) -> Result<String> {
        Ok(clean(&self.run(args).await?))
    }

    /// Returns true if the working directory is inside a repository.
    async fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .await
            .is_ok_and(|out| out.trim() == "true")
    }
}

/// [`Vcs`] implementation that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitCli {
    dir: PathBuf,
    cancel: CancellationToken,
}

impl GitCli {
    /// Creates a runner operating in `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Kills in-flight git processes when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Directory git runs in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn run(&self, args: &[&str]) -> Result<String> {
        let mut command = Command::new("git");
        command
            .current_dir(&self.dir)
            .args(["-c", "log.showSignature=false"])
            .args(args);
        match crate::process::output(command, &self.cancel).await {
            Err(Error::Process { output, .. }) => Err(Error::Git {
                command: args.join(" "),
                output,
            }),
            other => other,
        }
    }
}

/// Keeps the first line of `output`, stripping quotes and whitespace.
#[must_use]
pub fn clean(output: &str) -> String {
    output
        .replace('\'', "")
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Splits `output` into lines, dropping a single trailing empty line.
#[must_use]
pub fn lines(output: &str) -> Vec<String> {
    let mut lines: Vec<String> = output.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}
