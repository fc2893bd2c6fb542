//! Build target matrix generation.
//!
//! Targets are enumerated as OS x architecture x ARM variant in
//! configuration order, then filtered against the table of combinations
//! the Go toolchain supports and against the configured ignore list.

use shipwright_core::config::{Build, IgnoredBuild};
use std::fmt;

/// OS/architecture pairs the toolchain can produce binaries for.
const VALID_TARGETS: &[(&str, &str)] = &[
    ("android", "arm"),
    ("darwin", "386"),
    ("darwin", "amd64"),
    ("dragonfly", "amd64"),
    ("freebsd", "386"),
    ("freebsd", "amd64"),
    ("freebsd", "arm"),
    ("linux", "386"),
    ("linux", "amd64"),
    ("linux", "arm"),
    ("linux", "arm64"),
    ("linux", "ppc64"),
    ("linux", "ppc64le"),
    ("linux", "mips"),
    ("linux", "mipsle"),
    ("linux", "mips64"),
    ("linux", "mips64le"),
    ("linux", "s390x"),
    ("netbsd", "386"),
    ("netbsd", "amd64"),
    ("netbsd", "arm"),
    ("openbsd", "386"),
    ("openbsd", "amd64"),
    ("openbsd", "arm"),
    ("plan9", "386"),
    ("plan9", "amd64"),
    ("solaris", "amd64"),
    ("windows", "386"),
    ("windows", "amd64"),
];

/// One platform to build for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    /// Operating system.
    pub os: String,
    /// Architecture.
    pub arch: String,
    /// ARM variant, empty unless `arch` is `arm`.
    pub arm: String,
}

impl Target {
    /// Creates a target.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>, arm: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            arm: arm.into(),
        }
    }

    /// Returns true if the toolchain supports this OS/architecture pair.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        VALID_TARGETS
            .iter()
            .any(|(os, arch)| *os == self.os && *arch == self.arch)
    }

    /// Returns true if `ignore` matches this target. Empty fields in
    /// `ignore` match anything.
    #[must_use]
    pub fn is_ignored_by(&self, ignore: &IgnoredBuild) -> bool {
        let field = |pattern: &str, value: &str| pattern.is_empty() || pattern == value;
        field(&ignore.goos, &self.os)
            && field(&ignore.goarch, &self.arch)
            && field(&ignore.goarm, &self.arm)
    }

    /// `os/arch` or `os/arch/arm`.
    #[must_use]
    pub fn slash(&self) -> String {
        if self.arm.is_empty() {
            format!("{}/{}", self.os, self.arch)
        } else {
            format!("{}/{}/{}", self.os, self.arch, self.arm)
        }
    }
}

impl fmt::Display for Target {
    /// `os_arch` or `os_arch_arm`, used in output directory names.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)?;
        if !self.arm.is_empty() {
            write!(f, "_{}", self.arm)?;
        }
        Ok(())
    }
}

/// Enumerates the targets of `build`.
#[must_use]
pub fn matrix(build: &Build) -> Vec<Target> {
    let mut targets = Vec::new();
    for os in &build.goos {
        for arch in &build.goarch {
            if arch == "arm" {
                for arm in &build.goarm {
                    targets.push(Target::new(os, arch, arm));
                }
            } else {
                targets.push(Target::new(os, arch, ""));
            }
        }
    }

    targets
        .into_iter()
        .filter(|target| {
            if !target.is_valid() {
                tracing::debug!(target = %target.slash(), "skipped invalid build");
                return false;
            }
            if build.ignore.iter().any(|ignore| target.is_ignored_by(ignore)) {
                tracing::debug!(target = %target.slash(), "skipped ignored build");
                return false;
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| (*v).to_string()).collect()
    }

    fn ignore(goos: &str, goarch: &str, goarm: &str) -> IgnoredBuild {
        IgnoredBuild {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
            goarm: goarm.to_string(),
        }
    }

    fn slashes(targets: &[Target]) -> Vec<String> {
        targets.iter().map(Target::slash).collect()
    }

    #[test]
    fn test_matrix_drops_invalid_and_ignored() {
        let build = Build {
            goos: strings(&["linux", "darwin"]),
            goarch: strings(&["386", "amd64", "arm"]),
            goarm: strings(&["6", "7"]),
            ignore: vec![ignore("darwin", "386", "")],
            ..Build::default()
        };
        assert_eq!(
            slashes(&matrix(&build)),
            vec![
                "linux/386",
                "linux/amd64",
                "linux/arm/6",
                "linux/arm/7",
                "darwin/amd64"
            ]
        );
    }

    #[test]
    fn test_matrix_variant_specific_ignores() {
        let build = Build {
            goos: strings(&["linux", "darwin", "freebsd", "openbsd"]),
            goarch: strings(&["386", "amd64", "arm", "arm64"]),
            goarm: strings(&["6", "7"]),
            ignore: vec![
                ignore("darwin", "386", ""),
                ignore("linux", "arm", "7"),
                ignore("openbsd", "arm", ""),
            ],
            ..Build::default()
        };
        assert_eq!(
            slashes(&matrix(&build)),
            vec![
                "linux/386",
                "linux/amd64",
                "linux/arm/6",
                "linux/arm64",
                "darwin/amd64",
                "freebsd/386",
                "freebsd/amd64",
                "freebsd/arm/6",
                "freebsd/arm/7",
                "openbsd/386",
                "openbsd/amd64",
            ]
        );
    }

    #[test]
    fn test_categorically_invalid_targets() {
        for (os, arch) in [
            ("darwin", "arm"),
            ("darwin", "arm64"),
            ("windows", "arm"),
            ("windows", "arm64"),
        ] {
            assert!(!Target::new(os, arch, "").is_valid(), "{os}/{arch}");
        }
        assert!(Target::new("linux", "s390x", "").is_valid());
    }

    #[test]
    fn test_arm_without_variants_yields_nothing() {
        let build = Build {
            goos: strings(&["linux"]),
            goarch: strings(&["arm"]),
            ..Build::default()
        };
        assert!(matrix(&build).is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Target::new("linux", "arm", "6").to_string(), "linux_arm_6");
        assert_eq!(Target::new("windows", "amd64", "").to_string(), "windows_amd64");
    }
}
