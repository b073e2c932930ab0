//! package.json model

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DoctorError;

pub type DependencyMap = BTreeMap<String, String>;

/// The parts of package.json the checks read
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default)]
    pub dev_dependencies: DependencyMap,
    #[serde(default)]
    pub peer_dependencies: DependencyMap,
    #[serde(default)]
    pub optional_dependencies: DependencyMap,
    #[serde(default)]
    pub engines: BTreeMap<String, String>,
    #[serde(default)]
    pub os: Vec<String>,
    #[serde(default)]
    pub cpu: Vec<String>,
    #[serde(default)]
    pub workspaces: Option<Workspaces>,
    #[serde(default)]
    pub eslint_config: Option<serde_json::Value>,
}

/// `workspaces` is either a list of globs or `{ "packages": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Workspaces {
    Patterns(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

impl Workspaces {
    pub fn patterns(&self) -> &[String] {
        match self {
            Workspaces::Patterns(patterns) => patterns,
            Workspaces::Object { packages } => packages,
        }
    }
}

impl PackageJson {
    /// Load `<dir>/package.json`
    pub fn load(dir: &Path) -> Result<Self, DoctorError> {
        let path = dir.join("package.json");
        if !path.is_file() {
            return Err(DoctorError::ManifestNotFound(dir.to_path_buf()));
        }
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, DoctorError> {
        let content = fs::read_to_string(path)
            .map_err(|_| DoctorError::ManifestNotFound(path.to_path_buf()))?;
        Self::parse(&content, path.to_path_buf())
    }

    pub fn parse(content: &str, path: PathBuf) -> Result<Self, DoctorError> {
        serde_json::from_str(content).map_err(|source| DoctorError::InvalidManifest { path, source })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    pub fn display_version(&self) -> &str {
        self.version.as_deref().unwrap_or("unknown")
    }

    /// Dependencies and devDependencies merged; dev entries win on clashes
    pub fn all_dependencies(&self) -> DependencyMap {
        let mut all = self.dependencies.clone();
        all.extend(
            self.dev_dependencies
                .iter()
                .map(|(name, spec)| (name.clone(), spec.clone())),
        );
        all
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.dependencies.contains_key(name) || self.dev_dependencies.contains_key(name)
    }

    /// Declared spec from dependencies, falling back to devDependencies
    pub fn dependency_spec(&self, name: &str) -> Option<&str> {
        self.dependencies
            .get(name)
            .or_else(|| self.dev_dependencies.get(name))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_manifest() {
        let json = r#"{
            "name": "app",
            "version": "1.0.0",
            "dependencies": { "react": "^18.2.0" },
            "devDependencies": { "typescript": "~5.3.0", "react": "18.2.0" },
            "engines": { "node": ">=18" },
            "os": ["darwin", "!win32"],
            "workspaces": { "packages": ["packages/*"] }
        }"#;
        let pkg = PackageJson::parse(json, PathBuf::from("package.json")).unwrap();
        assert_eq!(pkg.display_name(), "app");
        assert_eq!(pkg.engines.get("node").map(String::as_str), Some(">=18"));
        assert_eq!(pkg.workspaces.unwrap().patterns(), ["packages/*"]);
        assert_eq!(pkg.os.len(), 2);
    }

    #[test]
    fn test_all_dependencies_prefers_dev() {
        let json = r#"{"dependencies":{"a":"1"},"devDependencies":{"a":"2","b":"3"}}"#;
        let pkg = PackageJson::parse(json, PathBuf::from("package.json")).unwrap();
        let all = pkg.all_dependencies();
        assert_eq!(all.get("a").map(String::as_str), Some("2"));
        assert_eq!(all.len(), 2);
        assert_eq!(pkg.dependency_spec("a"), Some("1"));
        assert!(pkg.has_dependency("b"));
    }

    #[test]
    fn test_missing_and_invalid() {
        let temp = tempdir().unwrap();
        assert!(matches!(
            PackageJson::load(temp.path()),
            Err(DoctorError::ManifestNotFound(_))
        ));

        std::fs::write(temp.path().join("package.json"), "{ not json").unwrap();
        assert!(matches!(
            PackageJson::load(temp.path()),
            Err(DoctorError::InvalidManifest { .. })
        ));
    }

    #[test]
    fn test_workspaces_array_form() {
        let json = r#"{"workspaces":["apps/*","packages/*"]}"#;
        let pkg = PackageJson::parse(json, PathBuf::from("package.json")).unwrap();
        assert_eq!(pkg.workspaces.as_ref().unwrap().patterns().len(), 2);
        assert_eq!(pkg.display_version(), "unknown");
    }
}
