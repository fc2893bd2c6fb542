//! Output directory preparation.

use async_trait::async_trait;
use shipwright_core::{Context, Error, Outcome, Result, Stage};
use tracing::info;

/// Creates the dist directory, refusing to reuse a non-empty one.
#[derive(Debug, Default, Clone, Copy)]
pub struct DistStage;

#[async_trait]
impl Stage for DistStage {
    fn description(&self) -> &str {
        "checking dist directory"
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let dist = ctx.dist();
        if dist.parent().is_none() || dist == ctx.root() {
            return Err(Error::config(
                format!("refusing to use {} as dist directory", dist.display()),
                "Point `dist` at a dedicated subdirectory",
            ));
        }

        if dist.exists() {
            if ctx.options.rm_dist {
                info!(path = %dist.display(), "removing old dist directory");
                tokio::fs::remove_dir_all(&dist).await?;
            } else {
                let mut entries = tokio::fs::read_dir(&dist).await?;
                if entries.next_entry().await?.is_some() {
                    return Err(Error::config(
                        format!("{} is not empty", dist.display()),
                        "Remove it or rerun with --rm-dist",
                    ));
                }
            }
        }

        tokio::fs::create_dir_all(&dist).await?;
        Ok(Outcome::Completed)
    }
}
