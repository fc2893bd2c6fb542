//! Source archive of the released commit.

use async_trait::async_trait;
use shipwright_core::artifact::{extra, Artifact, ArtifactType};
use shipwright_core::{Context, Defaulter, Outcome, Result, Skipper, Stage};
use tracing::info;

/// Name template used when none is configured.
pub const DEFAULT_NAME_TEMPLATE: &str = "{{ .ProjectName }}-{{ .Version }}";

/// Runs `git archive` when source archives are enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct SourceStage;

impl Defaulter for SourceStage {
    fn set_defaults(&self, ctx: &mut Context) -> Result<()> {
        let source = &mut ctx.config.source;
        if source.format.is_empty() {
            source.format = "tar.gz".to_string();
        }
        if source.name_template.is_empty() {
            source.name_template = DEFAULT_NAME_TEMPLATE.to_string();
        }
        Ok(())
    }
}

impl Skipper for SourceStage {
    fn skip(&self, ctx: &Context) -> Result<Option<String>> {
        Ok((!ctx.config.source.enabled).then(|| "source archive is disabled".to_string()))
    }
}

#[async_trait]
impl Stage for SourceStage {
    fn description(&self) -> &str {
        "creating source archive"
    }

    fn defaulter(&self) -> Option<&dyn Defaulter> {
        Some(self)
    }

    fn skipper(&self) -> Option<&dyn Skipper> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let source = &ctx.config.source;
        let name = format!("{}.{}", ctx.apply_template(&source.name_template)?, source.format);
        let prefix = ctx.apply_template(&source.prefix_template)?;
        let path = ctx.dist().join(&name);
        let reference = match ctx.git.full_commit.as_str() {
            "" | "none" => "HEAD",
            commit => commit,
        };

        info!(archive = %path.display(), reference, "creating source archive");
        let format = format!("--format={}", source.format);
        let output = format!("--output={}", path.display());
        let prefix = format!("--prefix={prefix}");
        ctx.vcs()
            .run(&["archive", &format, &output, &prefix, reference])
            .await?;

        ctx.artifacts.add(
            Artifact::new(name, path, ArtifactType::UploadableSourceArchive)
                .with_extra(extra::FORMAT, source.format.clone()),
        );
        Ok(Outcome::Completed)
    }
}
