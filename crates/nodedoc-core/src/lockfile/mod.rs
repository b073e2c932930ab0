//! Lock file parsing and duplicate detection
//!
//! All three package managers are flattened into a list of
//! [`PackageInstance`]s: one entry per installed copy of a package.
//!
//! - npm: `package-lock.json` (lockfileVersion 1, 2, 3)
//! - yarn: `yarn.lock` (classic v1 and berry)
//! - pnpm: `pnpm-lock.yaml` (v5, v6, v9 key formats)

mod npm;
mod pnpm;
mod yarn;

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::config::DisplaySettings;
use crate::constants::lockfiles;
use crate::error::DoctorError;
use crate::report::{Finding, IntoReport, Report, Section};

/// Which package manager wrote the lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockfileKind {
    Npm,
    Yarn,
    Pnpm,
}

impl LockfileKind {
    /// Detection order when several lock files exist
    pub const PRIORITY: [LockfileKind; 3] = [LockfileKind::Pnpm, LockfileKind::Yarn, LockfileKind::Npm];

    pub fn file_name(&self) -> &'static str {
        match self {
            LockfileKind::Npm => lockfiles::NPM,
            LockfileKind::Yarn => lockfiles::YARN,
            LockfileKind::Pnpm => lockfiles::PNPM,
        }
    }

    /// Package manager command name
    pub fn manager(&self) -> &'static str {
        match self {
            LockfileKind::Npm => "npm",
            LockfileKind::Yarn => "yarn",
            LockfileKind::Pnpm => "pnpm",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        Self::PRIORITY
            .into_iter()
            .find(|kind| name.ends_with(kind.file_name()))
    }

    /// Find the lock file in a project directory
    pub fn detect(dir: &Path) -> Option<(Self, PathBuf)> {
        Self::PRIORITY.into_iter().find_map(|kind| {
            let path = dir.join(kind.file_name());
            path.is_file().then_some((kind, path))
        })
    }
}

impl fmt::Display for LockfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manager())
    }
}

/// One installed copy of a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageInstance {
    pub name: String,
    pub version: String,
    /// Install location (npm) or resolution key (yarn, pnpm)
    pub path: String,
    /// Nesting depth; 0 for hoisted/top-level entries
    pub depth: usize,
}

/// A parsed lock file
#[derive(Debug, Clone, Serialize)]
pub struct Lockfile {
    pub kind: LockfileKind,
    pub path: PathBuf,
    pub instances: Vec<PackageInstance>,
}

impl Lockfile {
    /// Load and parse; the kind is taken from the file name
    pub fn load(path: &Path) -> Result<Self> {
        let kind = LockfileKind::from_path(path)
            .ok_or_else(|| DoctorError::UnsupportedLockfile(path.to_path_buf()))?;
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let lockfile = Self::parse(kind, &content, path)?;
        debug!(
            "Parsed {} lock file {:?}: {} instances",
            kind,
            path,
            lockfile.instances.len()
        );
        Ok(lockfile)
    }

    pub fn parse(kind: LockfileKind, content: &str, path: &Path) -> Result<Self> {
        let malformed = |message: String| DoctorError::MalformedLockfile {
            path: path.to_path_buf(),
            message,
        };

        let instances = match kind {
            LockfileKind::Npm => npm::parse(content).map_err(malformed)?,
            LockfileKind::Yarn => yarn::parse(content),
            LockfileKind::Pnpm => pnpm::parse(content).map_err(malformed)?,
        };

        Ok(Self {
            kind,
            path: path.to_path_buf(),
            instances,
        })
    }

    /// Instances grouped by package name
    pub fn by_name(&self) -> BTreeMap<&str, Vec<&PackageInstance>> {
        let mut grouped: BTreeMap<&str, Vec<&PackageInstance>> = BTreeMap::new();
        for instance in &self.instances {
            grouped.entry(&instance.name).or_default().push(instance);
        }
        grouped
    }

    /// Packages installed at more than one version
    pub fn find_duplicates(&self) -> Vec<Duplicate> {
        self.by_name()
            .into_iter()
            .filter_map(|(name, instances)| {
                let mut versions: BTreeMap<String, Vec<String>> = BTreeMap::new();
                for instance in instances {
                    versions
                        .entry(instance.version.clone())
                        .or_default()
                        .push(instance.path.clone());
                }
                (versions.len() > 1).then(|| Duplicate {
                    name: name.to_string(),
                    versions,
                })
            })
            .collect()
    }

    /// Duplicate analysis ready for reporting
    pub fn duplicate_report(&self, display: &DisplaySettings) -> DuplicateReport {
        DuplicateReport {
            lockfile: self.path.clone(),
            kind: self.kind,
            total_packages: self.by_name().len(),
            duplicates: self.find_duplicates(),
            max_paths: display.max_paths,
        }
    }
}

/// A package resolved to several versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Duplicate {
    pub name: String,
    /// version -> install paths
    pub versions: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub lockfile: PathBuf,
    pub kind: LockfileKind,
    pub total_packages: usize,
    pub duplicates: Vec<Duplicate>,
    #[serde(skip)]
    max_paths: usize,
}

impl IntoReport for DuplicateReport {
    fn to_report(&self) -> Report {
        let report = Report::new("Lock File Duplicate Analysis")
            .line(format!("Analyzing: {}", self.lockfile.display()));

        if self.duplicates.is_empty() {
            return report.section(
                Section::new("Duplicates").with(Finding::pass("No duplicate dependencies found!")),
            );
        }

        let mut section = Section::new(format!(
            "Found {} packages with multiple versions",
            self.duplicates.len()
        ));
        for dup in &self.duplicates {
            let mut finding = Finding::warn(dup.name.clone());
            for (version, paths) in &dup.versions {
                finding = finding.detail(format!("├─ version {}", version));
                for path in paths.iter().take(self.max_paths) {
                    finding = finding.detail(format!("│  └─ {}", path));
                }
                if paths.len() > self.max_paths {
                    finding = finding.detail(format!(
                        "│  └─ ... and {} more",
                        paths.len() - self.max_paths
                    ));
                }
            }
            section.push(finding);
        }

        let manager = self.kind.manager();
        report
            .section(section)
            .section(
                Section::new("Totals")
                    .with(Finding::info(format!(
                        "Total packages analyzed: {}",
                        self.total_packages
                    )))
                    .with(Finding::info(format!(
                        "Packages with duplicates: {}",
                        self.duplicates.len()
                    ))),
            )
            .recommend(format!("Run: {} dedupe", manager))
            .recommend("If using Expo: npx expo install --fix")
            .recommend("Consider using resolutions/overrides in package.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn instance(name: &str, version: &str, path: &str) -> PackageInstance {
        PackageInstance {
            name: name.into(),
            version: version.into(),
            path: path.into(),
            depth: 0,
        }
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            LockfileKind::from_path(Path::new("/x/package-lock.json")),
            Some(LockfileKind::Npm)
        );
        assert_eq!(
            LockfileKind::from_path(Path::new("yarn.lock")),
            Some(LockfileKind::Yarn)
        );
        assert_eq!(
            LockfileKind::from_path(Path::new("pnpm-lock.yaml")),
            Some(LockfileKind::Pnpm)
        );
        assert_eq!(LockfileKind::from_path(Path::new("Cargo.lock")), None);
    }

    #[test]
    fn test_detect_prefers_pnpm() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("package-lock.json"), "{}").unwrap();
        fs::write(temp.path().join("pnpm-lock.yaml"), "").unwrap();
        let (kind, _) = LockfileKind::detect(temp.path()).unwrap();
        assert_eq!(kind, LockfileKind::Pnpm);
    }

    #[test]
    fn test_find_duplicates() {
        let lockfile = Lockfile {
            kind: LockfileKind::Npm,
            path: PathBuf::from("package-lock.json"),
            instances: vec![
                instance("lodash", "4.17.21", "node_modules/lodash"),
                instance("lodash", "4.17.20", "node_modules/a/node_modules/lodash"),
                instance("react", "18.2.0", "node_modules/react"),
                instance("react", "18.2.0", "node_modules/b/node_modules/react"),
            ],
        };

        let duplicates = lockfile.find_duplicates();
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].name, "lodash");
        assert_eq!(
            duplicates[0].versions.keys().collect::<Vec<_>>(),
            ["4.17.20", "4.17.21"]
        );

        let report = lockfile
            .duplicate_report(&DisplaySettings::default())
            .to_report()
            .to_string();
        assert!(report.contains("Found 1 packages with multiple versions"));
        assert!(report.contains("Run: npm dedupe"));
    }

    #[test]
    fn test_unsupported_lockfile() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("Cargo.lock");
        fs::write(&path, "").unwrap();
        let err = Lockfile::load(&path).unwrap_err();
        assert!(err.downcast_ref::<DoctorError>().is_some());
    }
}
