//! Snapshot version naming.

use async_trait::async_trait;
use shipwright_core::{Context, Defaulter, Error, Outcome, Result, Skipper, Stage};

/// Version template used when none is configured.
pub const DEFAULT_NAME_TEMPLATE: &str = "{{ .Version }}-SNAPSHOT-{{ .ShortCommit }}";

/// Replaces the version with a rendered snapshot name.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotStage;

impl Defaulter for SnapshotStage {
    fn set_defaults(&self, ctx: &mut Context) -> Result<()> {
        if ctx.config.snapshot.name_template.is_empty() {
            ctx.config.snapshot.name_template = DEFAULT_NAME_TEMPLATE.to_string();
        }
        Ok(())
    }
}

impl Skipper for SnapshotStage {
    fn skip(&self, ctx: &Context) -> Result<Option<String>> {
        Ok((!ctx.options.snapshot).then(|| "not a snapshot".to_string()))
    }
}

#[async_trait]
impl Stage for SnapshotStage {
    fn description(&self) -> &str {
        "snapshotting"
    }

    fn defaulter(&self) -> Option<&dyn Defaulter> {
        Some(self)
    }

    fn skipper(&self) -> Option<&dyn Skipper> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let name = ctx.apply_template(&ctx.config.snapshot.name_template)?;
        if name.is_empty() {
            return Err(Error::config(
                "empty snapshot name",
                "Check snapshot.name_template",
            ));
        }
        tracing::info!(version = %name, "snapshot version");
        ctx.version = name;
        Ok(Outcome::Completed)
    }
}
