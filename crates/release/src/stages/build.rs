//! Cross compilation of every configured build.
//!
//! Each build expands into a target matrix (see [`crate::buildtarget`]) and
//! every target is compiled as its own task on a [`TaskGroup`]. Output lands
//! in `<dist>/<id>_<os>_<arch>[_<arm>]/<binary>[.exe]`.

use crate::buildtarget::{self, Target};
use async_trait::async_trait;
use shipwright_core::artifact::{extra, Artifact, ArtifactType};
use shipwright_core::config::Build;
use shipwright_core::{
    process, Context, Defaulter, Error, Outcome, Result, Skipper, Stage, TaskGroup,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

const DEFAULT_LDFLAGS: &str =
    "-s -w -X main.version={{ .Version }} -X main.commit={{ .Commit }} -X main.date={{ .Date }}";

/// Compiles binaries for every build target.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildStage;

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn set_build_defaults(build: &mut Build, project_name: &str) {
    if build.id.is_empty() {
        build.id = project_name.to_string();
    }
    if build.binary.is_empty() {
        build.binary = project_name.to_string();
    }
    if build.main.is_empty() {
        build.main = ".".to_string();
    }
    if build.command.is_empty() {
        build.command = strings(&["go", "build"]);
    }
    if build.ldflags.is_empty() {
        build.ldflags = vec![DEFAULT_LDFLAGS.to_string()];
    }
    if build.goos.is_empty() {
        build.goos = strings(&["linux", "darwin"]);
    }
    if build.goarch.is_empty() {
        build.goarch = strings(&["amd64", "386"]);
    }
    if build.goarm.is_empty() {
        build.goarm = strings(&["6"]);
    }
}

impl Defaulter for BuildStage {
    fn set_defaults(&self, ctx: &mut Context) -> Result<()> {
        if ctx.config.builds.is_empty() {
            ctx.config.builds.push(Build::default());
        }
        let project_name = ctx.config.project_name.clone();
        let mut seen = HashSet::new();
        for build in &mut ctx.config.builds {
            set_build_defaults(build, &project_name);
            if !seen.insert(build.id.clone()) {
                return Err(Error::config(
                    format!("found 2 builds with the ID '{}'", build.id),
                    "Give every build a unique `id`",
                ));
            }
        }
        Ok(())
    }
}

impl Skipper for BuildStage {
    fn skip(&self, ctx: &Context) -> Result<Option<String>> {
        Ok(ctx
            .config
            .builds
            .iter()
            .all(|b| b.skip)
            .then(|| "every build is marked skip".to_string()))
    }
}

/// Splits `KEY=VALUE` entries.
fn parse_env(entries: &[String]) -> Result<Vec<(String, String)>> {
    entries
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| {
                    Error::config(
                        format!("invalid build environment entry \"{entry}\""),
                        "Entries must look like KEY=value",
                    )
                })
        })
        .collect()
}

fn build_dir(ctx: &Context, build: &Build) -> PathBuf {
    if build.dir.is_empty() {
        ctx.root().to_path_buf()
    } else {
        ctx.root().join(&build.dir)
    }
}

async fn run_hooks(ctx: &Context, build: &Build, hooks: &[String], dir: &Path) -> Result<()> {
    for hook in hooks {
        let rendered = ctx.apply_template(hook)?;
        let mut parts = rendered.split_whitespace();
        let Some(program) = parts.next() else {
            continue;
        };
        info!(build = %build.id, hook = %rendered, "running hook");
        let mut command = Command::new(program);
        command.args(parts).current_dir(dir).envs(&ctx.env);
        process::output(command, ctx.cancellation()).await?;
    }
    Ok(())
}

/// Path of the binary produced for `target`.
#[must_use]
pub fn output_path(dist: &Path, build: &Build, target: &Target) -> PathBuf {
    dist.join(format!("{}_{target}", build.id))
        .join(format!("{}{}", build.binary, extension(target)))
}

fn extension(target: &Target) -> &'static str {
    if target.os == "windows" { ".exe" } else { "" }
}

fn command_for(
    ctx: &Context,
    build: &Build,
    target: &Target,
    output: &Path,
    env: &[(String, String)],
) -> Result<Command> {
    let (program, args) = build.command.split_first().ok_or_else(|| {
        Error::config(
            format!("build '{}' has an empty command", build.id),
            "Set `command` to the compiler invocation",
        )
    })?;
    let ldflags = build
        .ldflags
        .iter()
        .map(|flags| ctx.apply_template(flags))
        .collect::<Result<Vec<_>>>()?
        .join(" ");

    let mut command = Command::new(program);
    command
        .args(args)
        .args(&build.flags)
        .arg(format!("-ldflags={ldflags}"))
        .arg("-o")
        .arg(output)
        .arg(&build.main)
        .current_dir(build_dir(ctx, build))
        .envs(&ctx.env)
        .envs(env.iter().cloned())
        .env("GOOS", &target.os)
        .env("GOARCH", &target.arch)
        .env("GOARM", &target.arm);
    Ok(command)
}

#[async_trait]
impl Stage for BuildStage {
    fn description(&self) -> &str {
        "building binaries"
    }

    fn defaulter(&self) -> Option<&dyn Defaulter> {
        Some(self)
    }

    fn skipper(&self) -> Option<&dyn Skipper> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let dist = ctx.dist();
        for build in ctx.config.builds.iter().filter(|b| !b.skip) {
            let dir = build_dir(ctx, build);
            run_hooks(ctx, build, &build.hooks.pre, &dir).await?;

            let env = parse_env(&build.env)?;
            let mut group = TaskGroup::new(ctx.parallelism());
            for target in buildtarget::matrix(build) {
                let output = output_path(&dist, build, &target);
                let command = command_for(ctx, build, &target, &output, &env)?;
                let cancel = ctx.cancellation().clone();
                let artifacts = ctx.artifacts.clone();
                let name = format!("{}{}", build.binary, extension(&target));
                let artifact = Artifact::new(name, output.clone(), ArtifactType::Binary)
                    .with_extra(extra::ID, build.id.clone())
                    .with_extra(extra::GOOS, target.os.clone())
                    .with_extra(extra::GOARCH, target.arch.clone())
                    .with_extra(extra::GOARM, target.arm.clone())
                    .with_extra(extra::BINARY, build.binary.clone())
                    .with_extra(extra::EXT, extension(&target));
                group.spawn(async move {
                    if let Some(parent) = output.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    info!(target = %target.slash(), "building");
                    process::output(command, &cancel).await?;
                    artifacts.add(artifact);
                    Ok(())
                });
            }
            debug!(build = %build.id, targets = group.len(), "waiting for builds");
            group.wait().await?;

            run_hooks(ctx, build, &build.hooks.post, &dir).await?;
        }
        Ok(Outcome::Completed)
    }
}
