//! Concrete release stages, in the order [`crate::default_pipeline`] runs
//! them.

pub mod archive;
pub mod build;
pub mod checksums;
pub mod dist;
pub mod env;
pub mod git;
pub mod metadata;
pub mod publish;
pub mod sign;
pub mod snapshot;
pub mod source;

pub use archive::ArchiveStage;
pub use build::BuildStage;
pub use checksums::ChecksumStage;
pub use dist::DistStage;
pub use env::EnvStage;
pub use git::GitStage;
pub use metadata::MetadataStage;
pub use publish::{PublishStage, Publisher};
pub use sign::SignStage;
pub use snapshot::SnapshotStage;
pub use source::SourceStage;
