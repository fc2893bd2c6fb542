//! Ordered stage runner.
//!
//! A [`Pipeline`] is a fixed list of [`Stage`]s executed one after the
//! other against a shared [`Context`]. For each stage the runner:
//!
//! 1. resolves defaults, if the stage is a [`Defaulter`];
//! 2. asks whether to skip, if the stage is a [`Skipper`];
//! 3. runs the stage body.
//!
//! A skip is never an error. It is logged with its reason and the run moves
//! on, whether it came from the skip check or from the body returning
//! [`Outcome::Skipped`]. Any error aborts the run.

use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

/// Result of running a stage body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The stage did its work.
    Completed,
    /// The stage opted out, with a human readable reason.
    Skipped(String),
}

impl Outcome {
    /// Creates a skip outcome.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    /// Returns true for [`Outcome::Skipped`].
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Fills unset configuration before a stage runs.
pub trait Defaulter: Send + Sync {
    /// Sets defaults on `ctx.config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be completed.
    fn set_defaults(&self, ctx: &mut Context) -> Result<()>;
}

/// Decides whether a stage should be bypassed.
pub trait Skipper: Send + Sync {
    /// Returns the reason to skip, or `None` to run.
    ///
    /// # Errors
    ///
    /// An error aborts the run.
    fn skip(&self, ctx: &Context) -> Result<Option<String>>;
}

/// One step of the release.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Single line description used in logs and errors.
    fn description(&self) -> &str;

    /// Default resolution capability.
    fn defaulter(&self) -> Option<&dyn Defaulter> {
        None
    }

    /// Skip evaluation capability.
    fn skipper(&self) -> Option<&dyn Skipper> {
        None
    }

    /// Does the work.
    ///
    /// # Errors
    ///
    /// Any error aborts the run.
    async fn run(&self, ctx: &mut Context) -> Result<Outcome>;
}

/// Final status of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// The body ran to completion.
    Completed,
    /// The stage was skipped.
    Skipped(String),
}

/// What happened to one stage.
#[derive(Debug, Clone)]
pub struct StageReport {
    /// Stage description.
    pub description: String,
    /// Status.
    pub status: StageStatus,
    /// Time spent in the stage, defaults included.
    pub duration: Duration,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// One entry per stage, in order.
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Descriptions of the stages whose body ran.
    #[must_use]
    pub fn completed(&self) -> Vec<&str> {
        self.with_status(|s| matches!(s, StageStatus::Completed))
    }

    /// Descriptions of the skipped stages.
    #[must_use]
    pub fn skipped(&self) -> Vec<&str> {
        self.with_status(|s| matches!(s, StageStatus::Skipped(_)))
    }

    fn with_status(&self, pred: impl Fn(&StageStatus) -> bool) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|r| pred(&r.status))
            .map(|r| r.description.as_str())
            .collect()
    }
}

/// An ordered list of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.description()))
            .finish()
    }
}

impl Pipeline {
    /// Creates a pipeline from `stages`.
    #[must_use]
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Appends a stage.
    #[must_use]
    pub fn with_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Stage descriptions, in order.
    #[must_use]
    pub fn descriptions(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.description()).collect()
    }

    /// Applies every stage's defaults without running anything.
    ///
    /// # Errors
    ///
    /// Returns the first defaulting failure wrapped in [`Error::Stage`].
    pub fn resolve_defaults(&self, ctx: &mut Context) -> Result<()> {
        for stage in &self.stages {
            if let Some(defaulter) = stage.defaulter() {
                defaulter
                    .set_defaults(ctx)
                    .map_err(|e| Error::stage(stage.description(), e))?;
            }
        }
        Ok(())
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure wrapped in [`Error::Stage`], or
    /// [`Error::Cancelled`] if the run was cancelled between stages.
    #[instrument(name = "pipeline", skip_all, fields(stages = self.stages.len()))]
    pub async fn run(&self, ctx: &mut Context) -> Result<RunReport> {
        let mut report = RunReport::default();
        for stage in &self.stages {
            if ctx.cancellation().is_cancelled() {
                return Err(Error::Cancelled);
            }
            let description = stage.description();
            let started = Instant::now();
            let status = Self::run_stage(stage.as_ref(), ctx)
                .await
                .map_err(|e| match e {
                    Error::Cancelled => Error::Cancelled,
                    other => Error::stage(description, other),
                })?;
            report.stages.push(StageReport {
                description: description.to_string(),
                status,
                duration: started.elapsed(),
            });
        }
        Ok(report)
    }

    async fn run_stage(stage: &dyn Stage, ctx: &mut Context) -> Result<StageStatus> {
        let description = stage.description();
        if let Some(defaulter) = stage.defaulter() {
            defaulter.set_defaults(ctx)?;
        }
        if let Some(skipper) = stage.skipper()
            && let Some(reason) = skipper.skip(ctx)?
        {
            info!(stage = description, reason = %reason, "skipped");
            return Ok(StageStatus::Skipped(reason));
        }

        info!(stage = description, "running");
        match stage.run(ctx).await? {
            Outcome::Completed => Ok(StageStatus::Completed),
            Outcome::Skipped(reason) => {
                info!(stage = description, reason = %reason, "skipped");
                Ok(StageStatus::Skipped(reason))
            }
        }
    }
}
