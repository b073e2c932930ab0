//! Dependency checks
//!
//! Each check takes a [`Project`] plus whatever environment it needs
//! (tool versions, a command runner, a registry) and returns a serializable
//! result implementing [`IntoReport`](crate::report::IntoReport).

pub mod audit;
pub mod breaking;
pub mod bundle;
pub mod diagnose;
pub mod engines;
pub mod eslint;
pub mod monorepo;
pub mod peers;
pub mod react_native;
pub mod tsconfig;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::manifest::PackageJson;
use crate::versions::VersionSpec;

/// A Node.js project on disk
#[derive(Debug, Clone)]
pub struct Project {
    pub dir: PathBuf,
    pub manifest: PackageJson,
}

impl Project {
    /// Load the project rooted at `dir` (its package.json must exist)
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = PackageJson::load(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest,
        })
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.join(relative)
    }

    pub fn has_file(&self, relative: &str) -> bool {
        self.dir.join(relative).is_file()
    }

    pub fn has_dir(&self, relative: &str) -> bool {
        self.dir.join(relative).is_dir()
    }

    pub fn is_expo(&self) -> bool {
        self.manifest.has_dependency("expo")
    }
}

/// Registry lookup `(package, spec)` for a declared dependency; `None` for
/// workspace, path, git and URL specs. Aliases resolve to the real package.
pub(crate) fn registry_request(name: &str, spec: &str) -> Option<(String, String)> {
    match VersionSpec::parse(spec) {
        VersionSpec::Range(range) => Some((name.to_string(), range)),
        VersionSpec::Tag(tag) => Some((name.to_string(), tag)),
        VersionSpec::Alias { package, range } => Some((package, range)),
        _ => None,
    }
}

/// Major version a dependency spec starts from, e.g. `^8.57.0` -> 8
pub(crate) fn spec_major(spec: &str) -> Option<u64> {
    crate::versions::Range::parse(spec)
        .ok()?
        .min_version()
        .map(|v| v.major)
}

/// Same, for 0.x packages where the minor carries the meaning (react-native)
pub(crate) fn spec_minor_of_zero(spec: &str) -> Option<u64> {
    let min = crate::versions::Range::parse(spec).ok()?.min_version()?;
    (min.major == 0).then_some(min.minor)
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_spec_major() {
        assert_eq!(spec_major("^8.57.0"), Some(8));
        assert_eq!(spec_major(">=9"), Some(9));
        assert_eq!(spec_major("latest"), None);
        assert_eq!(spec_minor_of_zero("^0.72.4"), Some(72));
        assert_eq!(spec_minor_of_zero("1.0.0"), None);
    }

    #[test]
    fn test_registry_request() {
        assert_eq!(
            registry_request("react", "^18.2.0"),
            Some(("react".to_string(), "^18.2.0".to_string()))
        );
        assert_eq!(
            registry_request("lodash-es", "npm:lodash@^4.17.0"),
            Some(("lodash".to_string(), "^4.17.0".to_string()))
        );
        assert_eq!(registry_request("ui", "workspace:*"), None);
        assert_eq!(registry_request("local", "file:../local"), None);
    }

    #[test]
    fn test_project_load() {
        let temp = tempdir().unwrap();
        fixtures::write(
            temp.path(),
            "package.json",
            r#"{"name":"app","dependencies":{"expo":"~50.0.0"}}"#,
        );
        let project = Project::load(temp.path()).unwrap();
        assert!(project.is_expo());
        assert!(project.has_file("package.json"));
        assert!(!project.has_dir("node_modules"));
    }
}
