//! Artifact registry.
//!
//! Every file a stage produces is recorded here as an [`Artifact`]. Later
//! stages select the subset they care about with composable [`Filter`]s:
//!
//! ```rust
//! use shipwright_core::artifact::{self, Artifact, ArtifactType, Artifacts};
//!
//! let artifacts = Artifacts::new();
//! artifacts.add(Artifact::new("app.tar.gz", "dist/app.tar.gz", ArtifactType::UploadableArchive));
//! artifacts.add(Artifact::new("app", "dist/app", ArtifactType::Binary));
//!
//! let uploads = artifacts.filter(&artifact::or([
//!     artifact::by_type(ArtifactType::UploadableArchive),
//!     artifact::by_type(ArtifactType::UploadableBinary),
//! ]));
//! assert_eq!(uploads.len(), 1);
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Well known keys of the artifact metadata bag.
pub mod extra {
    /// Id of the build or archive configuration that produced the artifact.
    pub const ID: &str = "ID";
    /// Target operating system.
    pub const GOOS: &str = "Goos";
    /// Target architecture.
    pub const GOARCH: &str = "Goarch";
    /// Target ARM variant.
    pub const GOARM: &str = "Goarm";
    /// Binary name without extension.
    pub const BINARY: &str = "Binary";
    /// File extension of the produced file.
    pub const EXT: &str = "Ext";
    /// Archive format.
    pub const FORMAT: &str = "Format";
    /// Digest computed by the checksum stage, as `algorithm:hex`.
    pub const CHECKSUM: &str = "Checksum";
}

/// The closed set of artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactType {
    /// A compiled binary, not uploaded directly.
    Binary,
    /// An archive containing binaries and extra files.
    UploadableArchive,
    /// A binary uploaded as-is.
    UploadableBinary,
    /// Any other file meant for upload.
    UploadableFile,
    /// An archive of the source tree.
    UploadableSourceArchive,
    /// A deb/rpm/apk package.
    LinuxPackage,
    /// The checksums file.
    Checksum,
    /// A detached signature.
    Signature,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Binary => "Binary",
            Self::UploadableArchive => "Archive",
            Self::UploadableBinary => "Uploadable Binary",
            Self::UploadableFile => "File",
            Self::UploadableSourceArchive => "Source",
            Self::LinuxPackage => "Linux Package",
            Self::Checksum => "Checksum",
            Self::Signature => "Signature",
        };
        f.write_str(name)
    }
}

/// One produced file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Display name, also used as the upload file name.
    pub name: String,
    /// Location on disk.
    pub path: PathBuf,
    /// Kind of artifact.
    #[serde(rename = "type")]
    pub kind: ArtifactType,
    /// Open metadata bag, see [`extra`] for the common keys.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl Artifact {
    /// Creates an artifact with an empty metadata bag.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, kind: ArtifactType) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            extra: BTreeMap::new(),
        }
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns a metadata entry as a string slice, if present and a string.
    #[must_use]
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    /// Target operating system, empty if not platform specific.
    #[must_use]
    pub fn goos(&self) -> &str {
        self.extra_str(extra::GOOS).unwrap_or_default()
    }

    /// Target architecture, empty if not platform specific.
    #[must_use]
    pub fn goarch(&self) -> &str {
        self.extra_str(extra::GOARCH).unwrap_or_default()
    }

    /// Target ARM variant, empty unless `goarch` is `arm`.
    #[must_use]
    pub fn goarm(&self) -> &str {
        self.extra_str(extra::GOARM).unwrap_or_default()
    }

    /// Id of the configuration that produced this artifact.
    #[must_use]
    pub fn id(&self) -> &str {
        self.extra_str(extra::ID).unwrap_or_default()
    }

    /// Platform key used to group artifacts, e.g. `linuxarm6`.
    #[must_use]
    pub fn platform(&self) -> String {
        format!("{}{}{}", self.goos(), self.goarch(), self.goarm())
    }

    /// Path of the artifact as given at creation time.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

type Predicate = dyn Fn(&Artifact) -> bool + Send + Sync;

/// A composable artifact predicate.
#[derive(Clone)]
pub struct Filter(Arc<Predicate>);

impl Filter {
    /// Wraps an arbitrary predicate.
    pub fn new(predicate: impl Fn(&Artifact) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn matches(&self, artifact: &Artifact) -> bool {
        (self.0)(artifact)
    }

    /// Negates this filter.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::new(move |a| !self.matches(a))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

/// Matches artifacts of the given kind.
#[must_use]
pub fn by_type(kind: ArtifactType) -> Filter {
    Filter::new(move |a| a.kind == kind)
}

/// Matches artifacts whose `ID` metadata is one of `ids`.
#[must_use]
pub fn by_ids<I, S>(ids: I) -> Filter
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
    Filter::new(move |a| ids.iter().any(|id| id == a.id()))
}

/// Matches artifacts built for the given operating system.
#[must_use]
pub fn by_goos(goos: impl Into<String>) -> Filter {
    let goos = goos.into();
    Filter::new(move |a| a.goos() == goos)
}

/// Matches artifacts built for the given architecture.
#[must_use]
pub fn by_goarch(goarch: impl Into<String>) -> Filter {
    let goarch = goarch.into();
    Filter::new(move |a| a.goarch() == goarch)
}

/// Matches artifacts built for the given ARM variant.
#[must_use]
pub fn by_goarm(goarm: impl Into<String>) -> Filter {
    let goarm = goarm.into();
    Filter::new(move |a| a.goarm() == goarm)
}

/// Matches when every filter matches. An empty list matches everything.
#[must_use]
pub fn and(filters: impl IntoIterator<Item = Filter>) -> Filter {
    let filters: Vec<Filter> = filters.into_iter().collect();
    Filter::new(move |a| filters.iter().all(|f| f.matches(a)))
}

/// Matches when any filter matches. An empty list matches nothing.
#[must_use]
pub fn or(filters: impl IntoIterator<Item = Filter>) -> Filter {
    let filters: Vec<Filter> = filters.into_iter().collect();
    Filter::new(move |a| filters.iter().any(|f| f.matches(a)))
}

/// Thread-safe, insertion ordered collection of artifacts.
///
/// Cloning is cheap and yields a handle to the same collection. Views
/// returned by [`Artifacts::filter`] are detached snapshots.
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    items: Arc<RwLock<Vec<Artifact>>>,
}

impl Artifacts {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an artifact.
    pub fn add(&self, artifact: Artifact) {
        tracing::debug!(
            name = %artifact.name,
            path = %artifact.path.display(),
            kind = %artifact.kind,
            "added new artifact"
        );
        self.items.write().push(artifact);
    }

    /// Returns a copy of every artifact in insertion order.
    #[must_use]
    pub fn list(&self) -> Vec<Artifact> {
        self.items.read().clone()
    }

    /// Returns a snapshot view holding the matching artifacts.
    #[must_use]
    pub fn filter(&self, filter: &Filter) -> Self {
        let matching: Vec<Artifact> = self
            .items
            .read()
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        Self {
            items: Arc::new(RwLock::new(matching)),
        }
    }

    /// Number of artifacts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if no artifact was added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Groups artifacts by [`Artifact::platform`], keeping first-seen order.
    #[must_use]
    pub fn group_by_platform(&self) -> Vec<(String, Vec<Artifact>)> {
        let mut groups: Vec<(String, Vec<Artifact>)> = Vec::new();
        for artifact in self.items.read().iter() {
            let platform = artifact.platform();
            match groups.iter_mut().find(|(key, _)| *key == platform) {
                Some((_, members)) => members.push(artifact.clone()),
                None => groups.push((platform, vec![artifact.clone()])),
            }
        }
        groups
    }

    /// Sets a metadata entry on every matching artifact and returns how many
    /// were updated.
    pub fn enrich(&self, filter: &Filter, key: &str, value: impl Into<Value>) -> usize {
        let value = value.into();
        let mut items = self.items.write();
        let mut updated = 0;
        for artifact in items.iter_mut().filter(|a| filter.matches(a)) {
            artifact.extra.insert(key.to_string(), value.clone());
            updated += 1;
        }
        updated
    }
}
