//! Detached signatures.

use async_trait::async_trait;
use shipwright_core::artifact::{self, Artifact, ArtifactType, Filter};
use shipwright_core::config::SignArtifacts;
use shipwright_core::{process, Context, Defaulter, Outcome, Result, Skipper, Stage, TaskGroup};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::info;

/// Signs the checksum file, or every uploadable artifact, with an external
/// program.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignStage;

impl Defaulter for SignStage {
    fn set_defaults(&self, ctx: &mut Context) -> Result<()> {
        let sign = &mut ctx.config.sign;
        if sign.cmd.is_empty() {
            sign.cmd = "gpg".to_string();
        }
        if sign.signature.is_empty() {
            sign.signature = "{{ .Artifact }}.sig".to_string();
        }
        if sign.args.is_empty() {
            sign.args = ["--output", "{{ .Signature }}", "--detach-sig", "{{ .Artifact }}"]
                .iter()
                .map(|a| (*a).to_string())
                .collect();
        }
        Ok(())
    }
}

impl Skipper for SignStage {
    fn skip(&self, ctx: &Context) -> Result<Option<String>> {
        if ctx.options.skip_sign {
            return Ok(Some("artifact signing is disabled".to_string()));
        }
        Ok((ctx.config.sign.artifacts == SignArtifacts::None)
            .then(|| "no artifacts selected for signing".to_string()))
    }
}

fn selection(artifacts: SignArtifacts) -> Filter {
    let checksum = artifact::by_type(ArtifactType::Checksum);
    match artifacts {
        SignArtifacts::None => Filter::new(|_| false),
        SignArtifacts::Checksum => checksum,
        SignArtifacts::All => artifact::or([
            checksum,
            artifact::by_type(ArtifactType::UploadableArchive),
            artifact::by_type(ArtifactType::UploadableBinary),
            artifact::by_type(ArtifactType::UploadableSourceArchive),
            artifact::by_type(ArtifactType::LinuxPackage),
        ]),
    }
}

#[async_trait]
impl Stage for SignStage {
    fn description(&self) -> &str {
        "signing artifacts"
    }

    fn defaulter(&self) -> Option<&dyn Defaulter> {
        Some(self)
    }

    fn skipper(&self) -> Option<&dyn Skipper> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let sign = &ctx.config.sign;
        let targets = ctx.artifacts.filter(&selection(sign.artifacts)).list();
        let mut group = TaskGroup::new(ctx.parallelism());
        for target in targets {
            let artifact_path = target.path.display().to_string();
            let signature = PathBuf::from(
                ctx.apply_template_with(&sign.signature, &[("Artifact", &artifact_path)])?,
            );
            let signature_path = signature.display().to_string();
            let fields = [
                ("Artifact", artifact_path.as_str()),
                ("Signature", signature_path.as_str()),
            ];
            let args = sign
                .args
                .iter()
                .map(|arg| ctx.apply_template_with(arg, &fields))
                .collect::<Result<Vec<_>>>()?;

            let mut command = Command::new(&sign.cmd);
            command.args(&args).current_dir(ctx.root()).envs(&ctx.env);
            let cancel = ctx.cancellation().clone();
            let artifacts = ctx.artifacts.clone();
            let name = signature
                .file_name()
                .map_or_else(|| signature_path.clone(), |n| n.to_string_lossy().into_owned());
            group.spawn(async move {
                info!(artifact = %target.name, "signing");
                process::output(command, &cancel).await?;
                artifacts.add(Artifact::new(name, signature, ArtifactType::Signature));
                Ok(())
            });
        }
        group.wait().await?;
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipwright_core::{Project, RunOptions};
    use tempfile::TempDir;

    #[test]
    fn test_skip_reasons() {
        let mut ctx = Context::new(Project::default(), RunOptions::default(), ".");
        assert!(SignStage.skip(&ctx).unwrap().is_some());
        ctx.config.sign.artifacts = SignArtifacts::Checksum;
        assert_eq!(SignStage.skip(&ctx).unwrap(), None);
        ctx.options.skip_sign = true;
        assert_eq!(
            SignStage.skip(&ctx).unwrap().as_deref(),
            Some("artifact signing is disabled")
        );
    }

    #[test]
    fn test_selection() {
        let checksum = Artifact::new("sums.txt", "sums.txt", ArtifactType::Checksum);
        let archive = Artifact::new("a.tar.gz", "a.tar.gz", ArtifactType::UploadableArchive);
        let binary = Artifact::new("a", "a", ArtifactType::Binary);
        let only = selection(SignArtifacts::Checksum);
        assert!(only.matches(&checksum) && !only.matches(&archive));
        let all = selection(SignArtifacts::All);
        assert!(all.matches(&checksum) && all.matches(&archive) && !all.matches(&binary));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signs_checksum_file() {
        let root = TempDir::new().unwrap();
        let sums = root.path().join("sums.txt");
        std::fs::write(&sums, "sums").unwrap();
        let mut ctx = Context::new(Project::default(), RunOptions::default(), root.path());
        ctx.config.sign.artifacts = SignArtifacts::Checksum;
        ctx.config.sign.cmd = "cp".to_string();
        ctx.config.sign.args = vec!["{{ .Artifact }}".to_string(), "{{ .Signature }}".to_string()];
        SignStage.set_defaults(&mut ctx).unwrap();
        ctx.artifacts
            .add(Artifact::new("sums.txt", &sums, ArtifactType::Checksum));

        SignStage.run(&mut ctx).await.unwrap();

        let signatures = ctx
            .artifacts
            .filter(&artifact::by_type(ArtifactType::Signature))
            .list();
        assert_eq!(signatures.len(), 1);
        assert_eq!(signatures[0].name, "sums.txt.sig");
        assert_eq!(
            std::fs::read_to_string(root.path().join("sums.txt.sig")).unwrap(),
            "sums"
        );
    }
}
