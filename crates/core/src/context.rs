//! Run context threaded through every stage.
//!
//! Field ownership follows the stage order: the git stage writes [`GitInfo`]
//! and the version, the snapshot stage may rewrite the version, and the
//! changelog stage writes the release notes. Later stages only read them.
//! The artifact registry is the only part that is shared between
//! concurrent tasks.

use crate::artifact::Artifacts;
use crate::config::Project;
use crate::error::Result;
use crate::git::{GitCli, Vcs};
use crate::template::{Fields, SimpleTemplate, TemplateEngine};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default number of concurrent tasks per stage.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Facts about the repository being released.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitInfo {
    /// Current branch.
    pub branch: String,
    /// Tag being released.
    pub current_tag: String,
    /// Tag before the current one, empty if there is none.
    pub previous_tag: String,
    /// Commit the tag points to.
    pub commit: String,
    /// Abbreviated commit.
    pub short_commit: String,
    /// Full commit hash.
    pub full_commit: String,
    /// Commit date.
    pub commit_date: Option<DateTime<Utc>>,
    /// Remote origin URL.
    pub url: String,
    /// `git describe` summary.
    pub summary: String,
    /// Working tree has uncommitted changes.
    pub dirty: bool,
}

/// Release host a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `GITHUB_TOKEN`
    Github,
    /// `GITLAB_TOKEN`
    Gitlab,
    /// `GITEA_TOKEN`
    Gitea,
}

impl TokenKind {
    /// Environment variable holding the token.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Github => "GITHUB_TOKEN",
            Self::Gitlab => "GITLAB_TOKEN",
            Self::Gitea => "GITEA_TOKEN",
        }
    }

    /// Every supported host.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Github, Self::Gitlab, Self::Gitea]
    }
}

/// Credential handed to publishers.
#[derive(Clone, PartialEq, Eq)]
pub struct ReleaseToken {
    /// Host the token belongs to.
    pub kind: TokenKind,
    /// Secret value.
    pub value: String,
}

impl std::fmt::Debug for ReleaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseToken")
            .field("kind", &self.kind)
            .field("value", &"[redacted]")
            .finish()
    }
}

/// Flags controlling a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Build an unversioned snapshot, skipping validation and publishing.
    pub snapshot: bool,
    /// Skip repository validation.
    pub skip_validate: bool,
    /// Skip publishers.
    pub skip_publish: bool,
    /// Skip signing.
    pub skip_sign: bool,
    /// Remove the dist directory before building.
    pub rm_dist: bool,
    /// Maximum concurrent tasks per stage.
    pub parallelism: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            snapshot: false,
            skip_validate: false,
            skip_publish: false,
            skip_sign: false,
            rm_dist: false,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// State of one release run.
#[derive(Debug, Clone)]
pub struct Context {
    /// Resolved configuration.
    pub config: Project,
    /// Every artifact produced so far.
    pub artifacts: Artifacts,
    /// Environment visible to templates and child processes.
    pub env: BTreeMap<String, String>,
    /// Repository facts.
    pub git: GitInfo,
    /// Version being released, without a leading `v`.
    pub version: String,
    /// Release notes, either supplied or generated.
    pub release_notes: String,
    /// Run start time.
    pub date: DateTime<Utc>,
    /// Run flags.
    pub options: RunOptions,
    /// Release host token, if one was found.
    pub token: Option<ReleaseToken>,
    root: PathBuf,
    cancel: CancellationToken,
    vcs: Arc<dyn Vcs>,
    templates: Arc<dyn TemplateEngine>,
}

impl Context {
    /// Creates a context rooted at `root`, running git there.
    #[must_use]
    pub fn new(config: Project, options: RunOptions, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let cancel = CancellationToken::new();
        let vcs = GitCli::new(&root).with_cancellation(cancel.clone());
        Self {
            config,
            artifacts: Artifacts::new(),
            env: std::env::vars().collect(),
            git: GitInfo::default(),
            version: String::new(),
            release_notes: String::new(),
            date: Utc::now(),
            options,
            token: None,
            root,
            cancel,
            vcs: Arc::new(vcs),
            templates: Arc::new(SimpleTemplate),
        }
    }

    /// Replaces the VCS runner.
    #[must_use]
    pub fn with_vcs(mut self, vcs: Arc<dyn Vcs>) -> Self {
        self.vcs = vcs;
        self
    }

    /// Replaces the template engine.
    #[must_use]
    pub fn with_templates(mut self, templates: Arc<dyn TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    /// Replaces the environment snapshot.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Uses `cancel` for this run. Must be called before [`Context::with_vcs`]
    /// for the default git runner to observe it.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.vcs = Arc::new(GitCli::new(&self.root).with_cancellation(cancel.clone()));
        self.cancel = cancel;
        self
    }

    /// VCS runner.
    #[must_use]
    pub fn vcs(&self) -> &dyn Vcs {
        self.vcs.as_ref()
    }

    /// Cancellation token for this run.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Project root directory.
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Absolute output directory.
    #[must_use]
    pub fn dist(&self) -> PathBuf {
        self.root.join(&self.config.dist)
    }

    /// Concurrency limit, never zero.
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.options.parallelism.max(1)
    }

    /// Fields every template can use.
    #[must_use]
    pub fn template_fields(&self) -> Fields {
        let (major, minor, patch) = split_version(&self.version);
        Fields::new()
            .with("ProjectName", self.config.project_name.clone())
            .with("Version", self.version.clone())
            .with("Tag", self.git.current_tag.clone())
            .with("PreviousTag", self.git.previous_tag.clone())
            .with("Branch", self.git.branch.clone())
            .with("Commit", self.git.commit.clone())
            .with("ShortCommit", self.git.short_commit.clone())
            .with("FullCommit", self.git.full_commit.clone())
            .with("GitURL", self.git.url.clone())
            .with("Summary", self.git.summary.clone())
            .with("Major", major)
            .with("Minor", minor)
            .with("Patch", patch)
            .with("IsSnapshot", if self.options.snapshot { "true" } else { "" })
            .with("Date", self.date.to_rfc3339())
            .with("Timestamp", self.date.timestamp().to_string())
            .with_env(self.env.clone())
    }

    /// Renders `template` with the standard fields.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn apply_template(&self, template: &str) -> Result<String> {
        self.templates.apply(template, &self.template_fields())
    }

    /// Renders `template` with the standard fields plus `extra`.
    ///
    /// # Errors
    ///
    /// Returns a template error if rendering fails.
    pub fn apply_template_with(&self, template: &str, extra: &[(&str, &str)]) -> Result<String> {
        let mut fields = self.template_fields();
        for (key, value) in extra {
            fields.insert(*key, *value);
        }
        self.templates.apply(template, &fields)
    }
}

fn split_version(version: &str) -> (String, String, String) {
    let core = version.split(['-', '+']).next().unwrap_or_default();
    let mut parts = core.split('.').map(str::to_string);
    (
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default(),
    )
}
