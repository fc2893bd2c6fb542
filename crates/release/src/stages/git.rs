//! Repository facts and release validation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shipwright_core::{Context, Error, GitInfo, Outcome, Result, Stage, ValidationError};
use tracing::{info, warn};

/// Overrides the detected current tag.
pub const CURRENT_TAG_ENV: &str = "SHIPWRIGHT_CURRENT_TAG";
/// Overrides the detected previous tag.
pub const PREVIOUS_TAG_ENV: &str = "SHIPWRIGHT_PREVIOUS_TAG";

const SNAPSHOT_TAG: &str = "v0.0.0";

/// Collects git facts, derives the version and validates the tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitStage;

fn env_override(ctx: &Context, key: &str) -> Option<String> {
    ctx.env.get(key).filter(|v| !v.is_empty()).cloned()
}

async fn current_tag(ctx: &Context) -> Result<String> {
    if let Some(tag) = env_override(ctx, CURRENT_TAG_ENV) {
        return Ok(tag);
    }
    match ctx.vcs().run_clean(&["describe", "--tags", "--abbrev=0"]).await {
        Ok(tag) if !tag.is_empty() => Ok(tag),
        _ if ctx.options.snapshot => Ok(SNAPSHOT_TAG.to_string()),
        _ => Err(ValidationError::NoTag.into()),
    }
}

async fn previous_tag(ctx: &Context, current: &str) -> String {
    if let Some(tag) = env_override(ctx, PREVIOUS_TAG_ENV) {
        return tag;
    }
    let parent = format!("{current}^");
    ctx.vcs()
        .run_clean(&["describe", "--tags", "--abbrev=0", parent.as_str()])
        .await
        .unwrap_or_default()
}

async fn collect(ctx: &Context) -> Result<GitInfo> {
    let vcs = ctx.vcs();
    if !vcs.is_repo().await {
        return Err(ValidationError::NotRepository.into());
    }

    let full_commit = vcs.run_clean(&["show", "--format=%H", "-s", "HEAD"]).await?;
    let short_commit = vcs.run_clean(&["show", "--format=%h", "-s", "HEAD"]).await?;
    let timestamp = vcs.run_clean(&["show", "--format=%ct", "-s", "HEAD"]).await?;
    let commit_date = timestamp
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    let branch = vcs
        .run_clean(&["rev-parse", "--abbrev-ref", "HEAD"])
        .await
        .unwrap_or_default();
    let url = vcs
        .run_clean(&["ls-remote", "--get-url"])
        .await
        .unwrap_or_default();
    let summary = vcs
        .run_clean(&["describe", "--tags", "--dirty", "--always"])
        .await
        .unwrap_or_default();
    let dirty = !vcs
        .run(&["status", "--porcelain"])
        .await?
        .trim()
        .is_empty();

    let current_tag = current_tag(ctx).await?;
    let previous_tag = previous_tag(ctx, &current_tag).await;

    Ok(GitInfo {
        branch,
        current_tag,
        previous_tag,
        commit: full_commit.clone(),
        short_commit,
        full_commit,
        commit_date,
        url,
        summary,
        dirty,
    })
}

fn snapshot_info() -> GitInfo {
    GitInfo {
        current_tag: SNAPSHOT_TAG.to_string(),
        commit: "none".to_string(),
        short_commit: "none".to_string(),
        full_commit: "none".to_string(),
        ..GitInfo::default()
    }
}

async fn validate(ctx: &Context) -> Result<()> {
    let vcs = ctx.vcs();
    let status = vcs.run(&["status", "--porcelain"]).await?;
    if !status.trim().is_empty() {
        return Err(ValidationError::DirtyTree {
            status: status.trim_end().to_string(),
        }
        .into());
    }
    let tag = ctx.git.current_tag.as_str();
    if vcs
        .run(&["describe", "--exact-match", "--tags", "--match", tag])
        .await
        .is_err()
    {
        return Err(ValidationError::WrongRef {
            commit: ctx.git.commit.clone(),
            tag: tag.to_string(),
        }
        .into());
    }
    Ok(())
}

#[async_trait]
impl Stage for GitStage {
    fn description(&self) -> &str {
        "getting and validating git state"
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        ctx.git = match collect(ctx).await {
            Ok(info) => info,
            Err(err @ (Error::Validation(ValidationError::NotRepository) | Error::Git { .. }))
                if ctx.options.snapshot =>
            {
                warn!(
                    error = %err,
                    "ignoring git errors in snapshot mode, using placeholder information"
                );
                snapshot_info()
            }
            Err(err) => return Err(err),
        };
        ctx.version = ctx.git.current_tag.trim_start_matches('v').to_string();
        if ctx.version.is_empty() {
            return Err(ValidationError::InvalidVersion {
                tag: ctx.git.current_tag.clone(),
            }
            .into());
        }
        info!(
            tag = %ctx.git.current_tag,
            previous = %ctx.git.previous_tag,
            commit = %ctx.git.commit,
            "releasing"
        );

        if ctx.options.snapshot {
            return Ok(Outcome::skip("validation is disabled in snapshot mode"));
        }
        if ctx.options.skip_validate {
            return Ok(Outcome::skip("validation is disabled by --skip-validate"));
        }
        validate(ctx).await?;
        Ok(Outcome::Completed)
    }
}
