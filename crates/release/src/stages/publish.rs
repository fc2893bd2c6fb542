//! Artifact publishing.
//!
//! Destinations implement [`Publisher`] and are registered on the
//! [`PublishStage`], which runs them one after another in registration
//! order:
//!
//! ```rust,ignore
//! use shipwright_release::stages::publish::{Publisher, PublishStage};
//!
//! #[derive(Debug)]
//! struct Mirror;
//!
//! #[async_trait]
//! impl Publisher for Mirror {
//!     fn name(&self) -> &str { "mirror" }
//!
//!     async fn publish(&self, ctx: &Context) -> Result<Outcome> {
//!         // upload ctx.artifacts...
//!         Ok(Outcome::Completed)
//!     }
//! }
//!
//! let stage = PublishStage::new(vec![Arc::new(Mirror)]);
//! ```

use async_trait::async_trait;
use shipwright_core::{Context, Error, Outcome, Result, Skipper, Stage};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A destination artifacts are released to.
#[async_trait]
pub trait Publisher: Send + Sync + fmt::Debug {
    /// Name used in logs and errors, e.g. `github`.
    fn name(&self) -> &str;

    /// Publishes the context's artifacts.
    ///
    /// A publisher that has nothing to do returns [`Outcome::Skipped`].
    async fn publish(&self, ctx: &Context) -> Result<Outcome>;
}

/// Runs every registered publisher in order.
#[derive(Debug, Default, Clone)]
pub struct PublishStage {
    publishers: Vec<Arc<dyn Publisher>>,
}

impl PublishStage {
    /// Creates the stage with `publishers`.
    #[must_use]
    pub fn new(publishers: Vec<Arc<dyn Publisher>>) -> Self {
        Self { publishers }
    }

    /// Names of the registered publishers.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.publishers.iter().map(|p| p.name()).collect()
    }
}

impl Skipper for PublishStage {
    fn skip(&self, ctx: &Context) -> Result<Option<String>> {
        let reason = if ctx.options.snapshot {
            Some("publishing is disabled in snapshot mode")
        } else if ctx.options.skip_publish {
            Some("publishing is disabled")
        } else if self.publishers.is_empty() {
            Some("no publishers registered")
        } else {
            None
        };
        Ok(reason.map(str::to_string))
    }
}

#[async_trait]
impl Stage for PublishStage {
    fn description(&self) -> &str {
        "publishing"
    }

    fn skipper(&self) -> Option<&dyn Skipper> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        for publisher in &self.publishers {
            match publisher
                .publish(ctx)
                .await
                .map_err(|e| Error::publish(publisher.name(), e))?
            {
                Outcome::Completed => info!(publisher = publisher.name(), "published"),
                Outcome::Skipped(reason) => {
                    info!(publisher = publisher.name(), reason = %reason, "publisher skipped");
                }
            }
        }
        Ok(Outcome::Completed)
    }
}
