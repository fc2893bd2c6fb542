//! Project configuration model.
//!
//! The configuration is read from YAML. Every field has a default, and
//! stages fill in the remaining blanks during default resolution.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File names searched, in order, when no configuration path is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &[
    ".shipwright.yml",
    ".shipwright.yaml",
    "shipwright.yml",
    "shipwright.yaml",
];

/// Root of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Project name used in default templates.
    pub project_name: String,
    /// Output directory.
    pub dist: PathBuf,
    /// `KEY=value` entries, values may be templates.
    pub env: Vec<String>,
    /// Builds to run.
    pub builds: Vec<Build>,
    /// Archives to create.
    pub archives: Vec<Archive>,
    /// Checksum file settings.
    pub checksum: Checksum,
    /// Changelog settings.
    pub changelog: Changelog,
    /// Snapshot naming settings.
    pub snapshot: Snapshot,
    /// Signing settings.
    pub sign: Sign,
    /// Source archive settings.
    pub source: Source,
    /// Release settings.
    pub release: Release,
}

impl Project {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Yaml`] if the document is invalid.
    pub fn from_yaml(source: &str) -> Result<Self> {
        if source.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(source)?)
    }

    /// Loads the configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::config(
                format!("failed to read {}: {e}", path.display()),
                "Pass an existing file with --config",
            )
        })?;
        tracing::debug!(path = %path.display(), "loading configuration");
        Self::from_yaml(&source)
    }

    /// Loads the first default configuration file found in `dir`, or an
    /// empty configuration if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if a found file cannot be parsed.
    pub fn discover(dir: &Path) -> Result<Self> {
        for name in DEFAULT_CONFIG_FILES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }
        tracing::warn!("could not find a config file, using defaults");
        Ok(Self::default())
    }
}

/// One build configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Build {
    /// Identifier referenced by archives and checksums.
    pub id: String,
    /// Output binary name.
    pub binary: String,
    /// Package or path to build.
    pub main: String,
    /// Working directory for the compiler.
    pub dir: String,
    /// Compiler command and leading arguments, default `go build`.
    pub command: Vec<String>,
    /// Extra compiler flags.
    pub flags: Vec<String>,
    /// Linker flags, may be templates.
    pub ldflags: Vec<String>,
    /// `KEY=value` environment for the compiler.
    pub env: Vec<String>,
    /// Target operating systems.
    pub goos: Vec<String>,
    /// Target architectures.
    pub goarch: Vec<String>,
    /// ARM variants, only used with `goarch: arm`.
    pub goarm: Vec<String>,
    /// Targets to leave out.
    pub ignore: Vec<IgnoredBuild>,
    /// Commands run around each target build.
    pub hooks: BuildHooks,
    /// Skip this build entirely.
    pub skip: bool,
}

/// Exclusion pattern for the build matrix. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoredBuild {
    /// Operating system.
    pub goos: String,
    /// Architecture.
    pub goarch: String,
    /// ARM variant.
    pub goarm: String,
}

/// Commands executed before and after each target build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildHooks {
    /// Run before the compiler.
    pub pre: Vec<String>,
    /// Run after the compiler.
    pub post: Vec<String>,
}

/// One archive configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Archive {
    /// Identifier used by checksum filtering.
    pub id: String,
    /// Build ids to include, all builds if empty.
    pub builds: Vec<String>,
    /// `tar.gz`, `tar`, `zip` or `binary`.
    pub format: String,
    /// Archive name template without extension.
    pub name_template: String,
    /// Extra files to include, as glob patterns.
    pub files: Vec<String>,
    /// Per operating system format overrides.
    pub format_overrides: Vec<FormatOverride>,
    /// Put the files in a top level directory named like the archive.
    pub wrap_in_directory: bool,
}

/// Archive format override for one operating system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOverride {
    /// Operating system.
    pub goos: String,
    /// Format to use.
    pub format: String,
}

/// Checksum file settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Checksum {
    /// File name template.
    pub name_template: String,
    /// `sha256` or `sha512`.
    pub algorithm: String,
    /// Restrict to artifacts with these ids.
    pub ids: Vec<String>,
    /// Do not produce a checksum file.
    pub disable: bool,
}

/// Where changelog entries come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangelogSource {
    /// Derived from `git log`.
    #[default]
    Git,
    /// Generated by the release host, used verbatim.
    GithubNative,
}

/// Changelog settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Changelog {
    /// Do not produce a changelog.
    pub disable: bool,
    /// Entry source.
    #[serde(rename = "use")]
    pub source: ChangelogSource,
    /// `asc`, `desc` or empty to keep log order.
    pub sort: String,
    /// Commit id length, negative removes the id.
    pub abbrev: i32,
    /// Message filters.
    pub filters: Filters,
    /// Ordered grouping rules.
    pub groups: Vec<ChangelogGroup>,
    /// Text placed above the entries.
    pub header: String,
    /// Text placed below the entries.
    pub footer: String,
}

/// Changelog message filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// Keep only entries matching one of these.
    pub include: Vec<String>,
    /// Drop entries matching one of these.
    pub exclude: Vec<String>,
}

/// A changelog grouping rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangelogGroup {
    /// Heading.
    pub title: String,
    /// Pattern, empty claims everything left.
    pub regexp: String,
    /// Render position, ascending.
    pub order: i32,
}

/// Snapshot naming settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    /// Version template used for snapshot runs.
    pub name_template: String,
}

/// Which artifacts get signed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignArtifacts {
    /// Nothing.
    #[default]
    None,
    /// The checksum file.
    Checksum,
    /// Every uploadable artifact and the checksum file.
    All,
}

/// Signing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sign {
    /// Signing program, default `gpg`.
    pub cmd: String,
    /// Arguments, templates over `.Artifact` and `.Signature`.
    pub args: Vec<String>,
    /// Signature path template.
    pub signature: String,
    /// Artifacts to sign.
    pub artifacts: SignArtifacts,
}

/// Source archive settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    /// Produce a source archive.
    pub enabled: bool,
    /// `tar.gz`, `tar` or `zip`.
    pub format: String,
    /// Name template without extension.
    pub name_template: String,
    /// Directory prefix template inside the archive.
    pub prefix_template: String,
}

/// Release settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    /// Do not publish a release.
    pub disable: bool,
}
