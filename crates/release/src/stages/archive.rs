//! Packaging of built binaries.
//!
//! Binaries are grouped per platform. Each group becomes one archive
//! holding the binaries plus the configured extra files, or, with the
//! `binary` format, is re-registered as uploadable binaries untouched.

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use shipwright_core::artifact::{self, extra, Artifact, ArtifactType};
use shipwright_core::config::Archive;
use shipwright_core::{Context, Defaulter, Error, Outcome, Result, Stage, TaskGroup};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;

/// Archive name template used when none is configured.
pub const DEFAULT_NAME_TEMPLATE: &str =
    "{{ .ProjectName }}_{{ .Version }}_{{ .Os }}_{{ .Arch }}{{ if .Arm }}v{{ .Arm }}{{ end }}";

const DEFAULT_FILES: &[&str] = &[
    "licen[sc]e*",
    "LICEN[SC]E*",
    "readme*",
    "README*",
    "changelog*",
    "CHANGELOG*",
];

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Gzip compressed tarball.
    TarGz,
    /// Plain tarball.
    Tar,
    /// Zip file.
    Zip,
    /// No archive, the binaries are uploaded as they are.
    Binary,
}

impl Format {
    /// Parses a configured format name.
    ///
    /// # Errors
    ///
    /// Returns a config error for unknown formats.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            "tar" => Ok(Self::Tar),
            "zip" => Ok(Self::Zip),
            "binary" => Ok(Self::Binary),
            other => Err(Error::config(
                format!("invalid archive format: {other}"),
                "Use one of tar.gz, tar, zip or binary",
            )),
        }
    }

    /// File extension including the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::TarGz => ".tar.gz",
            Self::Tar => ".tar",
            Self::Zip => ".zip",
            Self::Binary => "",
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Tar => "tar",
            Self::Zip => "zip",
            Self::Binary => "binary",
        }
    }
}

/// One file going into an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// File on disk.
    pub source: PathBuf,
    /// Path inside the archive.
    pub name: String,
    /// Unix permissions.
    pub mode: u32,
}

/// Creates archives for every configured archive.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveStage;

impl Defaulter for ArchiveStage {
    fn set_defaults(&self, ctx: &mut Context) -> Result<()> {
        if ctx.config.archives.is_empty() {
            ctx.config.archives.push(Archive::default());
        }
        let mut seen = HashSet::new();
        for archive in &mut ctx.config.archives {
            if archive.id.is_empty() {
                archive.id = "default".to_string();
            }
            if archive.format.is_empty() {
                archive.format = "tar.gz".to_string();
            }
            if archive.name_template.is_empty() {
                archive.name_template = DEFAULT_NAME_TEMPLATE.to_string();
            }
            if archive.files.is_empty() {
                archive.files = DEFAULT_FILES.iter().map(|f| (*f).to_string()).collect();
            }
            if !seen.insert(archive.id.clone()) {
                return Err(Error::config(
                    format!("found 2 archives with the ID '{}'", archive.id),
                    "Give every archive a unique `id`",
                ));
            }
        }
        Ok(())
    }
}

fn format_for(archive: &Archive, goos: &str) -> Result<Format> {
    let name = archive
        .format_overrides
        .iter()
        .find(|o| o.goos == goos)
        .map_or(archive.format.as_str(), |o| o.format.as_str());
    Format::parse(name)
}

/// Expands the `files` globs relative to `root`, in pattern order and
/// without duplicates.
///
/// # Errors
///
/// Returns a config error for malformed patterns.
pub fn extra_files(root: &Path, patterns: &[String]) -> Result<Vec<Entry>> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let paths = glob::glob(&full.to_string_lossy()).map_err(|e| {
            Error::config(
                format!("invalid file pattern \"{pattern}\": {e}"),
                "Check the archive `files` globs",
            )
        })?;
        for path in paths.flatten() {
            if !path.is_file() || !seen.insert(path.clone()) {
                continue;
            }
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            entries.push(Entry {
                source: path,
                name,
                mode: 0o644,
            });
        }
    }
    Ok(entries)
}

fn tar_entries<W: Write>(builder: &mut tar::Builder<W>, entries: &[Entry]) -> io::Result<()> {
    for entry in entries {
        let file = File::open(&entry.source)?;
        let mut header = tar::Header::new_gnu();
        header.set_path(&entry.name)?;
        header.set_size(file.metadata()?.len());
        header.set_mode(entry.mode);
        header.set_cksum();
        builder.append(&header, file)?;
    }
    Ok(())
}

fn write_tar_gz(output: &Path, entries: &[Entry]) -> io::Result<()> {
    let encoder = GzEncoder::new(File::create(output)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    tar_entries(&mut builder, entries)?;
    builder.into_inner()?.finish()?;
    Ok(())
}

fn write_tar(output: &Path, entries: &[Entry]) -> io::Result<()> {
    let mut builder = tar::Builder::new(File::create(output)?);
    tar_entries(&mut builder, entries)?;
    builder.into_inner()?.flush()
}

fn write_zip(output: &Path, entries: &[Entry]) -> io::Result<()> {
    let mut writer = zip::ZipWriter::new(File::create(output)?);
    for entry in entries {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(entry.mode);
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(io::Error::other)?;
        io::copy(&mut File::open(&entry.source)?, &mut writer)?;
    }
    writer.finish().map_err(io::Error::other)?;
    Ok(())
}

/// Writes `entries` to `output` in `format`.
///
/// # Errors
///
/// Returns an I/O error if a source cannot be read or the archive cannot
/// be written.
pub fn create(format: Format, output: &Path, entries: &[Entry]) -> Result<()> {
    match format {
        Format::TarGz => write_tar_gz(output, entries)?,
        Format::Tar => write_tar(output, entries)?,
        Format::Zip => write_zip(output, entries)?,
        Format::Binary => {
            return Err(Error::config(
                "the binary format does not produce an archive",
                "Use tar.gz, tar or zip",
            ));
        }
    }
    Ok(())
}

fn platform_fields(binary: &Artifact) -> [(&'static str, String); 4] {
    [
        ("Os", binary.goos().to_string()),
        ("Arch", binary.goarch().to_string()),
        ("Arm", binary.goarm().to_string()),
        (
            "Binary",
            binary
                .extra_str(extra::BINARY)
                .unwrap_or(binary.name.as_str())
                .to_string(),
        ),
    ]
}

fn render_name(ctx: &Context, archive: &Archive, binary: &Artifact) -> Result<String> {
    let fields = platform_fields(binary);
    let extra: Vec<(&str, &str)> = fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
    ctx.apply_template_with(&archive.name_template, &extra)
}

fn register_binaries(ctx: &Context, archive: &Archive, binaries: &[Artifact]) -> Result<()> {
    for binary in binaries {
        let name = format!(
            "{}{}",
            render_name(ctx, archive, binary)?,
            binary.extra_str(extra::EXT).unwrap_or_default()
        );
        debug!(name = %name, "registering uploadable binary");
        let mut uploadable = binary.clone();
        uploadable.name = name;
        uploadable.kind = ArtifactType::UploadableBinary;
        uploadable.extra.insert(extra::ID.to_string(), archive.id.clone().into());
        uploadable
            .extra
            .insert(extra::FORMAT.to_string(), Format::Binary.name().into());
        ctx.artifacts.add(uploadable);
    }
    Ok(())
}

#[async_trait]
impl Stage for ArchiveStage {
    fn description(&self) -> &str {
        "archives"
    }

    fn defaulter(&self) -> Option<&dyn Defaulter> {
        Some(self)
    }

    async fn run(&self, ctx: &mut Context) -> Result<Outcome> {
        let dist = ctx.dist();
        let mut jobs = Vec::new();
        let mut outputs = HashSet::new();
        for archive in &ctx.config.archives {
            let mut filter = artifact::by_type(ArtifactType::Binary);
            if !archive.builds.is_empty() {
                filter = artifact::and([filter, artifact::by_ids(archive.builds.clone())]);
            }
            let files = extra_files(ctx.root(), &archive.files)?;

            for (platform, binaries) in ctx.artifacts.filter(&filter).group_by_platform() {
                let Some(first) = binaries.first() else {
                    continue;
                };
                let format = format_for(archive, first.goos())?;
                if format == Format::Binary {
                    register_binaries(ctx, archive, &binaries)?;
                    continue;
                }

                let name = render_name(ctx, archive, first)?;
                let filename = format!("{name}{}", format.extension());
                let output = dist.join(&filename);
                if output.exists() || !outputs.insert(output.clone()) {
                    return Err(Error::config(
                        format!("archive named {} already exists", output.display()),
                        "Check your archive name template",
                    ));
                }
                let prefix = if archive.wrap_in_directory {
                    format!("{name}/")
                } else {
                    String::new()
                };
                let entries: Vec<Entry> = binaries
                    .iter()
                    .map(|b| Entry {
                        source: b.path.clone(),
                        name: format!("{prefix}{}", b.name),
                        mode: 0o755,
                    })
                    .chain(files.iter().map(|f| Entry {
                        name: format!("{prefix}{}", f.name),
                        ..f.clone()
                    }))
                    .collect();

                let uploadable =
                    Artifact::new(filename, output.clone(), ArtifactType::UploadableArchive)
                        .with_extra(extra::ID, archive.id.clone())
                        .with_extra(extra::GOOS, first.goos())
                        .with_extra(extra::GOARCH, first.goarch())
                        .with_extra(extra::GOARM, first.goarm())
                        .with_extra(extra::FORMAT, format.name());
                debug!(archive = %output.display(), platform = %platform, "planned archive");
                jobs.push((format, output, entries, uploadable));
            }
        }

        let mut group = TaskGroup::new(ctx.parallelism());
        for (format, output, entries, uploadable) in jobs {
            let artifacts = ctx.artifacts.clone();
            info!(archive = %output.display(), "creating archive");
            group.spawn_blocking(move || {
                create(format, &output, &entries)?;
                artifacts.add(uploadable);
                Ok(())
            });
        }
        group.wait().await?;
        Ok(Outcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use shipwright_core::config::FormatOverride;
    use shipwright_core::{Project, RunOptions};
    use std::io::Read;
    use tempfile::TempDir;

    fn binary(root: &Path, goos: &str, name: &str) -> Artifact {
        let path = root.join(format!("dist/app_{goos}_amd64/{name}"));
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "binary").unwrap();
        Artifact::new(name, path, ArtifactType::Binary)
            .with_extra(extra::ID, "app")
            .with_extra(extra::GOOS, goos)
            .with_extra(extra::GOARCH, "amd64")
            .with_extra(extra::GOARM, "")
            .with_extra(extra::BINARY, "app")
            .with_extra(extra::EXT, if goos == "windows" { ".exe" } else { "" })
    }

    fn ctx(root: &TempDir) -> Context {
        let mut ctx = Context::new(Project::default(), RunOptions::default(), root.path());
        ctx.config.project_name = "app".to_string();
        ctx.config.dist = PathBuf::from("dist");
        ctx.version = "1.2.3".to_string();
        ArchiveStage.set_defaults(&mut ctx).unwrap();
        ctx
    }

    fn tar_names(path: &Path) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
        archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(Format::parse("tgz").unwrap(), Format::TarGz);
        assert_eq!(Format::parse("zip").unwrap().extension(), ".zip");
        assert!(Format::parse("rar").is_err());
    }

    #[tokio::test]
    async fn test_archives_per_platform_with_overrides() {
        let root = TempDir::new().unwrap();
        std::fs::write(root.path().join("README.md"), "readme").unwrap();
        std::fs::write(root.path().join("LICENSE"), "license").unwrap();
        let mut ctx = ctx(&root);
        ctx.config.archives[0].format_overrides = vec![FormatOverride {
            goos: "windows".to_string(),
            format: "zip".to_string(),
        }];
        ctx.artifacts.add(binary(root.path(), "linux", "app"));
        ctx.artifacts.add(binary(root.path(), "windows", "app.exe"));

        ArchiveStage.run(&mut ctx).await.unwrap();

        let archives = ctx
            .artifacts
            .filter(&artifact::by_type(ArtifactType::UploadableArchive))
            .list();
        let mut names: Vec<&str> = archives.iter().map(|a| a.name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["app_1.2.3_linux_amd64.tar.gz", "app_1.2.3_windows_amd64.zip"]
        );

        let tarball = root.path().join("dist/app_1.2.3_linux_amd64.tar.gz");
        let mut entries = tar_names(&tarball);
        entries.sort();
        assert_eq!(entries, vec!["LICENSE", "README.md", "app"]);

        let zipped = File::open(root.path().join("dist/app_1.2.3_windows_amd64.zip")).unwrap();
        let mut zipped = zip::ZipArchive::new(zipped).unwrap();
        let mut contents = String::new();
        zipped.by_name("app.exe").unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "binary");
    }

    #[tokio::test]
    async fn test_wrap_in_directory() {
        let root = TempDir::new().unwrap();
        let mut ctx = ctx(&root);
        ctx.config.archives[0].wrap_in_directory = true;
        ctx.artifacts.add(binary(root.path(), "linux", "app"));

        ArchiveStage.run(&mut ctx).await.unwrap();

        let tarball = root.path().join("dist/app_1.2.3_linux_amd64.tar.gz");
        assert_eq!(tar_names(&tarball), vec!["app_1.2.3_linux_amd64/app"]);
    }

    #[tokio::test]
    async fn test_binary_format() {
        let root = TempDir::new().unwrap();
        let mut ctx = ctx(&root);
        ctx.config.archives[0].format = "binary".to_string();
        ctx.artifacts.add(binary(root.path(), "windows", "app.exe"));

        ArchiveStage.run(&mut ctx).await.unwrap();

        let uploads = ctx
            .artifacts
            .filter(&artifact::by_type(ArtifactType::UploadableBinary))
            .list();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "app_1.2.3_windows_amd64.exe");
        assert_eq!(uploads[0].path, root.path().join("dist/app_windows_amd64/app.exe"));
    }

    #[test]
    fn test_duplicate_archive_ids() {
        let root = TempDir::new().unwrap();
        let mut ctx = ctx(&root);
        ctx.config.archives.push(Archive::default());
        assert!(ArchiveStage.set_defaults(&mut ctx).is_err());
    }

    #[tokio::test]
    async fn test_colliding_archive_names() {
        let root = TempDir::new().unwrap();
        let mut ctx = ctx(&root);
        ctx.config.archives = vec![
            Archive {
                id: "a".to_string(),
                ..Archive::default()
            },
            Archive {
                id: "b".to_string(),
                ..Archive::default()
            },
        ];
        ArchiveStage.set_defaults(&mut ctx).unwrap();
        ctx.artifacts.add(binary(root.path(), "linux", "app"));

        let err = ArchiveStage.run(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("app_1.2.3_linux_amd64.tar.gz already exists"));
        assert!(
            ctx.artifacts
                .filter(&artifact::by_type(ArtifactType::UploadableArchive))
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_existing_archive_is_not_overwritten() {
        let root = TempDir::new().unwrap();
        let mut ctx = ctx(&root);
        ctx.artifacts.add(binary(root.path(), "linux", "app"));
        let stale = root.path().join("dist/app_1.2.3_linux_amd64.tar.gz");
        std::fs::write(&stale, "stale").unwrap();

        assert!(ArchiveStage.run(&mut ctx).await.is_err());
        assert_eq!(std::fs::read_to_string(&stale).unwrap(), "stale");
    }
}
