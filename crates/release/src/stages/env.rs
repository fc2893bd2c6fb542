//! Environment loading and project level defaults.

use async_trait::async_trait;
use shipwright_core::{Context, Defaulter, Error, Outcome, ReleaseToken, Result, Stage, TokenKind};
use std::path::PathBuf;
use tracing::debug;

/// Renders `env` entries into the context and detects the release token.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvStage;

impl Defaulter for EnvStage {
    fn set_defaults(&self, ctx: &mut Context) -> Result<()> {
        if ctx.config.dist.as_os_str().is_empty() {
            ctx.config.dist = PathBuf::from("dist");
        }
        if ctx.config.project_name.is_empty() {
            ctx.config.project_name = ctx
                .root()
                .canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "project".to_string());
        }
        Ok(())
    }
}

fn detect_token(ctx: &Context) -> Result<Option<ReleaseToken>> {
    let found: Vec<ReleaseToken> = TokenKind::all()
        .iter()
        .filter_map(|kind| {
            ctx.env
                .get(kind.env_var())
                .filter(|v| !v.is_empty())
                .map(|value| ReleaseToken {
                    kind: *kind,
                    value: value.clone(),
                })
        })
        .collect();
    if found.len() > 1 {
        let names: Vec<&str> = found.iter().map(|t| t.kind.env_var()).collect();
        return Err(Error::config(
            format!("multiple tokens found: {}", names.join(", ")),
            "Set only one release host token",
        ));
    }
    Ok(found.into_iter().next())
}

fn publishes(ctx: &Context) -> bool {
    !(ctx.options.snapshot || ctx.options.skip_publish || ctx.config.release.disable)
}

#[async_trait]
impl Stage for EnvStage {
    fn description(&self) -> &str {
        "loading environment variables"
    }

    fn defaulter(&self) -> Option<&dyn Defaulter> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        for entry in ctx.config.env.clone() {
            let (key, template) = entry.split_once('=').ok_or_else(|| {
                Error::config(
                    format!("invalid environment entry \"{entry}\""),
                    "Entries must look like KEY=value",
                )
            })?;
            let value = ctx.apply_template(template)?;
            debug!(key, "setting environment variable");
            ctx.env.insert(key.to_string(), value);
        }

        ctx.token = detect_token(ctx)?;
        match &ctx.token {
            Some(token) => debug!(kind = ?token.kind, "release token found"),
            None if publishes(ctx) => {
                let names: Vec<&str> = TokenKind::all().iter().map(|k| k.env_var()).collect();
                return Err(Error::config(
                    "missing release token",
                    format!(
                        "Set one of {} or rerun with --skip-publish",
                        names.join(", ")
                    ),
                ));
            }
            None => debug!("no release token found"),
        }
        Ok(Outcome::Completed)
    }
}
