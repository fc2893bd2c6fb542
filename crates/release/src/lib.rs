//! Release stages for shipwright.
//!
//! This crate turns a tagged repository into release artifacts. It builds on
//! the stage runner, context and artifact registry of `shipwright-core` and
//! provides:
//!
//! - [`buildtarget`] - the OS x architecture x ARM target matrix
//! - [`changelog`] - changelog generation from git history
//! - [`stages`] - every concrete stage, from environment loading to
//!   metadata output
//!
//! # Example
//!
//! ```rust,ignore
//! use shipwright_core::{Context, Project, RunOptions};
//! use shipwright_release::default_pipeline;
//!
//! let config = Project::discover(Path::new("."))?;
//! let mut ctx = Context::new(config, RunOptions::default(), ".");
//! let report = default_pipeline(Vec::new(), None).run(&mut ctx).await?;
//! ```

pub mod buildtarget;
pub mod changelog;
pub mod stages;

pub use buildtarget::Target;
pub use changelog::{ChangelogStage, NotesGenerator};
pub use stages::Publisher;

use shipwright_core::{Pipeline, Stage};
use std::sync::Arc;

/// Builds the standard release pipeline.
///
/// Stages run in this order: env, git, snapshot, dist, build, changelog,
/// archive, source, checksums, sign, publish, metadata. `native` backs the
/// `github-native` changelog source.
#[must_use]
pub fn default_pipeline(
    publishers: Vec<Arc<dyn Publisher>>,
    native: Option<Arc<dyn NotesGenerator>>,
) -> Pipeline {
    let changelog = match native {
        Some(generator) => ChangelogStage::new().with_native(generator),
        None => ChangelogStage::new(),
    };
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(stages::EnvStage),
        Box::new(stages::GitStage),
        Box::new(stages::SnapshotStage),
        Box::new(stages::DistStage),
        Box::new(stages::BuildStage),
        Box::new(changelog),
        Box::new(stages::ArchiveStage),
        Box::new(stages::SourceStage),
        Box::new(stages::ChecksumStage),
        Box::new(stages::SignStage),
        Box::new(stages::PublishStage::new(publishers)),
        Box::new(stages::MetadataStage),
    ];
    Pipeline::new(stages)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stage_order() {
        assert_eq!(
            default_pipeline(Vec::new(), None).descriptions(),
            vec![
                "loading environment variables",
                "getting and validating git state",
                "snapshotting",
                "checking dist directory",
                "building binaries",
                "generating changelog",
                "archives",
                "creating source archive",
                "calculating checksums",
                "signing artifacts",
                "publishing",
                "storing release metadata",
            ]
        );
    }
}
