//! Subcommand implementations.

use crate::cli::ReleaseArgs;
use crate::shutdown;
use miette::{IntoDiagnostic, WrapErr};
use shipwright_core::{Context, Project, RunOptions};
use shipwright_release::default_pipeline;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Example written by `shipwright init`.
pub const EXAMPLE_CONFIG: &str = r#"# shipwright configuration
builds:
  - env:
      - CGO_ENABLED=0
    goos: [linux, darwin, windows]
    goarch: [amd64, arm64]

archives:
  - format_overrides:
      - goos: windows
        format: zip

checksum:
  name_template: "{{ .ProjectName }}_{{ .Version }}_checksums.txt"

snapshot:
  name_template: "{{ .Version }}-SNAPSHOT-{{ .ShortCommit }}"

changelog:
  sort: asc
  filters:
    exclude:
      - "^docs:"
      - "^test:"
"#;

fn load_config(root: &Path, path: Option<&Path>) -> miette::Result<Project> {
    let project = match path {
        Some(path) => Project::load(&root.join(path))?,
        None => Project::discover(root)?,
    };
    Ok(project)
}

fn current_dir() -> miette::Result<PathBuf> {
    std::env::current_dir()
        .into_diagnostic()
        .wrap_err("Failed to determine the working directory")
}

/// Runs the full release pipeline.
#[instrument(name = "release", skip_all, fields(snapshot = args.snapshot))]
pub async fn release(args: ReleaseArgs) -> miette::Result<()> {
    let root = current_dir()?;
    let config = load_config(&root, args.config.as_deref())?;

    let cancel = CancellationToken::new();
    shutdown::install_signal_handlers(cancel.clone());
    shutdown::cancel_after(cancel.clone(), args.timeout);

    let mut ctx = Context::new(config, args.run_options(), &root).with_cancellation(cancel.clone());
    if let Some(notes) = &args.release_notes {
        ctx.release_notes = tokio::fs::read_to_string(root.join(notes))
            .await
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read release notes from {}", notes.display()))?;
    }

    let result = default_pipeline(Vec::new(), None).run(&mut ctx).await;
    cancel.cancel();
    let report = result?;

    info!(
        completed = report.completed().len(),
        skipped = report.skipped().len(),
        artifacts = ctx.artifacts.len(),
        version = %ctx.version,
        "release succeeded"
    );
    Ok(())
}

/// Loads the configuration and applies every stage's defaults.
pub fn check(config: Option<&Path>, print: bool) -> miette::Result<Option<String>> {
    let root = current_dir()?;
    let project = load_config(&root, config)?;
    let mut ctx = Context::new(project, RunOptions::default(), &root);
    default_pipeline(Vec::new(), None).resolve_defaults(&mut ctx)?;
    info!(
        project = %ctx.config.project_name,
        builds = ctx.config.builds.len(),
        archives = ctx.config.archives.len(),
        "config is valid"
    );
    if !print {
        return Ok(None);
    }
    serde_yaml::to_string(&ctx.config)
        .map(Some)
        .into_diagnostic()
        .wrap_err("Failed to render the configuration")
}

/// Writes [`EXAMPLE_CONFIG`] to `path`, refusing to overwrite.
pub fn init(path: &Path) -> miette::Result<()> {
    if path.exists() {
        return Err(miette::miette!(
            help = "Remove it first or pick another path with --config",
            "{} already exists",
            path.display()
        ));
    }
    std::fs::write(path, EXAMPLE_CONFIG)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "config created");
    Ok(())
}
