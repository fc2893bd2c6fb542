//! Machine readable release metadata.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use shipwright_core::{Context, Outcome, Result, Stage};
use tracing::info;

/// File listing every artifact.
pub const ARTIFACTS_FILE: &str = "artifacts.json";
/// File describing the release itself.
pub const METADATA_FILE: &str = "metadata.json";

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Project name.
    pub project_name: String,
    /// Released tag.
    pub tag: String,
    /// Tag of the previous release, empty for the first one.
    pub previous_tag: String,
    /// Version derived from the tag, or the snapshot name.
    pub version: String,
    /// Full commit hash.
    pub commit: String,
    /// Time the run started.
    pub date: DateTime<Utc>,
    /// Whether this was a snapshot run.
    pub snapshot: bool,
}

impl Metadata {
    /// Captures the release facts of `ctx`.
    #[must_use]
    pub fn from_context(ctx: &Context) -> Self {
        Self {
            project_name: ctx.config.project_name.clone(),
            tag: ctx.git.current_tag.clone(),
            previous_tag: ctx.git.previous_tag.clone(),
            version: ctx.version.clone(),
            commit: ctx.git.full_commit.clone(),
            date: ctx.date,
            snapshot: ctx.options.snapshot,
        }
    }
}

/// Writes `artifacts.json` and `metadata.json` into the dist directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataStage;

#[async_trait]
impl Stage for MetadataStage {
    fn description(&self) -> &str {
        "storing release metadata"
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let dist = ctx.dist();
        let artifacts = serde_json::to_vec_pretty(&ctx.artifacts.list())?;
        let metadata = serde_json::to_vec_pretty(&Metadata::from_context(ctx))?;

        info!(file = ARTIFACTS_FILE, "writing");
        tokio::fs::write(dist.join(ARTIFACTS_FILE), artifacts).await?;
        info!(file = METADATA_FILE, "writing");
        tokio::fs::write(dist.join(METADATA_FILE), metadata).await?;
        Ok(Outcome::Completed)
    }
}
