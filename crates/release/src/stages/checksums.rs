//! Checksum file generation.
//!
//! Every uploadable artifact is hashed on the blocking pool. Each digest is
//! recorded on its artifact as `algorithm:hex` and the sorted
//! `<hex>  <name>` lines are written to a single checksum file.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256, Sha512};
use shipwright_core::artifact::{self, extra, Artifact, ArtifactType, Filter};
use shipwright_core::{Context, Defaulter, Error, Outcome, Result, Skipper, Stage, TaskGroup};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Name template used when none is configured.
pub const DEFAULT_NAME_TEMPLATE: &str = "{{ .ProjectName }}_{{ .Version }}_checksums.txt";

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// SHA-256.
    Sha256,
    /// SHA-512.
    Sha512,
}

impl Algorithm {
    /// Parses a configured algorithm name.
    ///
    /// # Errors
    ///
    /// Returns a config error for unsupported algorithms.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(Error::config(
                format!("invalid checksum algorithm: {other}"),
                "Use sha256 or sha512",
            )),
        }
    }

    /// Name as used in artifact metadata.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }

    /// Hex digest of the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Artifact`] naming the file if it cannot be read.
    pub fn digest(self, path: &Path) -> Result<String> {
        match self {
            Self::Sha256 => hash_file::<Sha256>(path),
            Self::Sha512 => hash_file::<Sha512>(path),
        }
    }
}

fn hash_file<D: Digest>(path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| Error::artifact(format!("failed to open file for checksum: {e}"), path))?;
    let mut reader = BufReader::new(file);
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| Error::artifact(format!("failed to read file for checksum: {e}"), path))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
}

/// Artifacts that get a checksum line.
#[must_use]
pub fn uploadable(ids: &[String]) -> Filter {
    let kinds = artifact::or([
        artifact::by_type(ArtifactType::UploadableArchive),
        artifact::by_type(ArtifactType::UploadableBinary),
        artifact::by_type(ArtifactType::UploadableSourceArchive),
        artifact::by_type(ArtifactType::LinuxPackage),
    ]);
    if ids.is_empty() {
        kinds
    } else {
        artifact::and([kinds, artifact::by_ids(ids.to_vec())])
    }
}

/// Hashes uploadable artifacts into a checksum file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChecksumStage;

impl Defaulter for ChecksumStage {
    fn set_defaults(&self, ctx: &mut Context) -> Result<()> {
        let checksum = &mut ctx.config.checksum;
        if checksum.name_template.is_empty() {
            checksum.name_template = DEFAULT_NAME_TEMPLATE.to_string();
        }
        if checksum.algorithm.is_empty() {
            checksum.algorithm = "sha256".to_string();
        }
        Ok(())
    }
}

impl Skipper for ChecksumStage {
    fn skip(&self, ctx: &Context) -> Result<Option<String>> {
        Ok(ctx
            .config
            .checksum
            .disable
            .then(|| "checksum generation is disabled".to_string()))
    }
}

#[async_trait]
impl Stage for ChecksumStage {
    fn description(&self) -> &str {
        "calculating checksums"
    }

    fn defaulter(&self) -> Option<&dyn Defaulter> {
        Some(self)
    }

    fn skipper(&self) -> Option<&dyn Skipper> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let algorithm = Algorithm::parse(&ctx.config.checksum.algorithm)?;
        let filename = ctx.apply_template(&ctx.config.checksum.name_template)?;
        let path = ctx.dist().join(&filename);

        let lines = Arc::new(Mutex::new(Vec::new()));
        let mut group = TaskGroup::new(ctx.parallelism());
        for target in ctx.artifacts.filter(&uploadable(&ctx.config.checksum.ids)).list() {
            let lines = Arc::clone(&lines);
            let artifacts = ctx.artifacts.clone();
            group.spawn_blocking(move || {
                let hex = algorithm.digest(&target.path)?;
                debug!(artifact = %target.name, digest = %hex, "computed checksum");
                let name = target.name.clone();
                let path = target.path.clone();
                let same = Filter::new(move |a: &Artifact| a.name == name && a.path == path);
                artifacts.enrich(&same, extra::CHECKSUM, format!("{}:{hex}", algorithm.name()));
                lines.lock().push(format!("{hex}  {}\n", target.name));
                Ok(())
            });
        }
        group.wait().await?;

        let mut lines = std::mem::take(&mut *lines.lock());
        lines.sort();
        info!(file = %path.display(), entries = lines.len(), "writing checksums");
        tokio::fs::write(&path, lines.concat()).await?;

        ctx.artifacts
            .add(Artifact::new(filename, path, ArtifactType::Checksum));
        Ok(Outcome::Completed)
    }
}
