//! Error types shared by every pipeline stage.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Repository state problems detected before a release.
///
/// These are fatal in a normal run and downgraded to a skip in snapshot or
/// skip-validate mode.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The working tree has uncommitted changes.
    #[error("git is currently in a dirty state:\n{status}")]
    #[diagnostic(
        code(shipwright::validation::dirty),
        help("Commit or stash your changes, or rerun with --snapshot")
    )]
    DirtyTree {
        /// Output of `git status --porcelain`
        status: String,
    },

    /// HEAD does not point at the tag being released.
    #[error("git tag {tag} was not made against commit {commit}")]
    #[diagnostic(code(shipwright::validation::wrong_ref))]
    WrongRef {
        /// The commit HEAD points to
        commit: String,
        /// The tag being released
        tag: String,
    },

    /// The repository has no tags.
    #[error("git doesn't contain any tags")]
    #[diagnostic(
        code(shipwright::validation::no_tag),
        help("Create a tag with `git tag v0.1.0` or rerun with --snapshot")
    )]
    NoTag,

    /// The current directory is not inside a git repository.
    #[error("current folder is not a git repository")]
    #[diagnostic(code(shipwright::validation::not_repository))]
    NotRepository,

    /// The tag could not be turned into a version.
    #[error("invalid version derived from tag {tag}")]
    #[diagnostic(code(shipwright::validation::invalid_version))]
    InvalidVersion {
        /// The offending tag
        tag: String,
    },
}

/// Errors that can occur while running the release pipeline.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid or inconsistent configuration.
    #[error("configuration error: {message}")]
    #[diagnostic(code(shipwright::config), help("{help}"))]
    Config {
        /// The error message
        message: String,
        /// Help text for the user
        help: String,
    },

    /// A user supplied template could not be rendered.
    #[error("template: failed to apply \"{template}\": {message}")]
    #[diagnostic(code(shipwright::template))]
    Template {
        /// The template source
        template: String,
        /// What went wrong
        message: String,
    },

    /// A user supplied regular expression is invalid.
    #[error("invalid regular expression \"{pattern}\"{}", context_suffix(.context))]
    #[diagnostic(code(shipwright::pattern))]
    Pattern {
        /// The offending pattern
        pattern: String,
        /// Where the pattern was used, if known
        context: Option<String>,
        /// The regex compile error
        #[source]
        source: regex::Error,
    },

    /// Repository validation failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    /// A git invocation failed.
    #[error("git {command} failed: {output}")]
    #[diagnostic(code(shipwright::git))]
    Git {
        /// The git arguments
        command: String,
        /// Combined stdout and stderr
        output: String,
    },

    /// An external process exited unsuccessfully.
    #[error("{command} failed: {output}")]
    #[diagnostic(code(shipwright::process))]
    Process {
        /// The command line that was executed
        command: String,
        /// Combined stdout and stderr
        output: String,
    },

    /// More than one concurrent task failed.
    #[error("{} tasks failed:{}", .failures.len(), render_failures(.failures))]
    #[diagnostic(code(shipwright::tasks))]
    Tasks {
        /// Every failure, in completion order
        failures: Vec<Self>,
    },

    /// A concurrent task panicked or was aborted.
    #[error("task panicked: {message}")]
    #[diagnostic(code(shipwright::task_panic))]
    TaskPanic {
        /// The join error message
        message: String,
    },

    /// A pipeline stage failed.
    #[error("{stage}: {error}")]
    #[diagnostic(code(shipwright::stage))]
    Stage {
        /// Description of the failing stage
        stage: String,
        /// The underlying failure
        error: Box<Self>,
    },

    /// A publisher failed to publish artifacts.
    #[error("{publisher}: failed to publish artifacts: {error}")]
    #[diagnostic(code(shipwright::publish))]
    Publish {
        /// Name of the publisher
        publisher: String,
        /// The underlying failure
        error: Box<Self>,
    },

    /// The run was cancelled by a signal or timeout.
    #[error("release cancelled")]
    #[diagnostic(code(shipwright::cancelled))]
    Cancelled,

    /// An artifact file could not be read or written.
    #[error("{message}: {}", path.display())]
    #[diagnostic(code(shipwright::artifact))]
    Artifact {
        /// What went wrong
        message: String,
        /// The artifact file
        path: std::path::PathBuf,
    },

    /// Wrapped I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(shipwright::io))]
    Io(#[from] std::io::Error),

    /// Wrapped JSON error.
    #[error("JSON error: {0}")]
    #[diagnostic(code(shipwright::json))]
    Json(#[from] serde_json::Error),

    /// Wrapped YAML error.
    #[error("YAML error: {0}")]
    #[diagnostic(
        code(shipwright::yaml),
        help("Check the configuration file syntax")
    )]
    Yaml(#[from] serde_yaml::Error),
}

fn context_suffix(context: &Option<String>) -> String {
    context
        .as_ref()
        .map_or_else(String::new, |c| format!(" ({c})"))
}

fn render_failures(failures: &[Error]) -> String {
    failures.iter().fold(String::new(), |mut out, failure| {
        out.push_str("\n  - ");
        out.push_str(&failure.to_string());
        out
    })
}

impl Error {
    /// Create a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a new artifact error for the file at `path`.
    #[must_use]
    pub fn artifact(message: impl Into<String>, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Artifact {
            message: message.into(),
            path: path.into(),
        }
    }

    /// Create a new template error.
    #[must_use]
    pub fn template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid pattern error.
    #[must_use]
    pub fn pattern(
        pattern: impl Into<String>,
        context: Option<String>,
        source: regex::Error,
    ) -> Self {
        Self::Pattern {
            pattern: pattern.into(),
            context,
            source,
        }
    }

    /// Wrap an error with the description of the stage that produced it.
    #[must_use]
    pub fn stage(stage: impl Into<String>, error: Self) -> Self {
        Self::Stage {
            stage: stage.into(),
            error: Box::new(error),
        }
    }

    /// Wrap an error with the name of the publisher that produced it.
    #[must_use]
    pub fn publish(publisher: impl Into<String>, error: Self) -> Self {
        Self::Publish {
            publisher: publisher.into(),
            error: Box::new(error),
        }
    }

    /// Returns true if this is a repository validation failure.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Number of underlying failures this error represents.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        match self {
            Self::Tasks { failures } => failures.len(),
            Self::Stage { error, .. } => error.failure_count(),
            _ => 1,
        }
    }
}
