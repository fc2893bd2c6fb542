//! Core of the shipwright release engine.
//!
//! This crate holds the pieces every release stage builds on:
//!
//! - [`pipeline`] - the ordered stage runner and the [`Stage`] trait
//! - [`context`] - the [`Context`] threaded through a run
//! - [`artifact`] - the concurrency-safe artifact registry and its filters
//! - [`executor`] - a bounded task group that reports every failure
//! - [`config`] - the YAML configuration model
//! - [`git`], [`process`] and [`template`] - thin external collaborators
//!
//! Concrete stages live in `shipwright-release`.

pub mod artifact;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod git;
pub mod pipeline;
pub mod process;
pub mod template;

pub use artifact::{Artifact, ArtifactType, Artifacts, Filter};
pub use config::Project;
pub use context::{Context, GitInfo, ReleaseToken, RunOptions, TokenKind};
pub use error::{Error, Result, ValidationError};
pub use executor::TaskGroup;
pub use pipeline::{Defaulter, Outcome, Pipeline, RunReport, Skipper, Stage, StageStatus};
