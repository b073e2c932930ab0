//! ESLint configuration resolver
//!
//! Finds the active config, maps every `extends` and `plugins` entry to the
//! npm package ESLint would load, and checks those packages are declared.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{spec_major, Project};
use crate::jsonc;
use crate::manifest::DependencyMap;
use crate::report::{Finding, IntoReport, Report, Section};

const MIGRATION_GUIDE: &str = "https://eslint.org/docs/latest/use/configure/migration-guide";

/// Config files in ESLint's lookup order
const CONFIG_FILES: [(&str, ConfigKind, ConfigFormat); 10] = [
    ("eslint.config.js", ConfigKind::Flat, ConfigFormat::JavaScript),
    ("eslint.config.mjs", ConfigKind::Flat, ConfigFormat::JavaScript),
    ("eslint.config.cjs", ConfigKind::Flat, ConfigFormat::JavaScript),
    ("eslint.config.ts", ConfigKind::Flat, ConfigFormat::JavaScript),
    (".eslintrc.js", ConfigKind::Legacy, ConfigFormat::JavaScript),
    (".eslintrc.cjs", ConfigKind::Legacy, ConfigFormat::JavaScript),
    (".eslintrc.yaml", ConfigKind::Legacy, ConfigFormat::Yaml),
    (".eslintrc.yml", ConfigKind::Legacy, ConfigFormat::Yaml),
    (".eslintrc.json", ConfigKind::Legacy, ConfigFormat::Json),
    (".eslintrc", ConfigKind::Legacy, ConfigFormat::JsonOrYaml),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKind {
    /// `eslint.config.*` (ESLint 9 default)
    Flat,
    /// `.eslintrc.*`
    Legacy,
    /// `eslintConfig` in package.json
    PackageJson,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    JavaScript,
    Json,
    Yaml,
    JsonOrYaml,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigLocation {
    pub file: String,
    pub kind: ConfigKind,
    pub format: ConfigFormat,
}

/// Locate the config ESLint would use in `project`
pub fn find_config(project: &Project) -> Option<ConfigLocation> {
    CONFIG_FILES
        .iter()
        .find(|(file, _, _)| project.has_file(file))
        .map(|(file, kind, format)| ConfigLocation {
            file: file.to_string(),
            kind: *kind,
            format: *format,
        })
        .or_else(|| {
            project
                .manifest
                .eslint_config
                .is_some()
                .then(|| ConfigLocation {
                    file: "package.json".to_string(),
                    kind: ConfigKind::PackageJson,
                    format: ConfigFormat::Json,
                })
        })
}

/// Parse a legacy config. `Ok(None)` for JavaScript configs, which cannot
/// be read without executing them.
pub fn load_config(project: &Project, location: &ConfigLocation) -> Result<Option<Value>> {
    if location.kind == ConfigKind::PackageJson {
        return Ok(project.manifest.eslint_config.clone());
    }
    if location.format == ConfigFormat::JavaScript {
        return Ok(None);
    }

    let path = project.path(&location.file);
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
    parse_config(&content, location.format, &path).map(Some)
}

fn parse_config(content: &str, format: ConfigFormat, path: &Path) -> Result<Value> {
    match format {
        ConfigFormat::Json => {
            jsonc::from_str(content).with_context(|| format!("Invalid JSON in {:?}", path))
        }
        ConfigFormat::Yaml => {
            serde_yaml::from_str(content).with_context(|| format!("Invalid YAML in {:?}", path))
        }
        ConfigFormat::JsonOrYaml => jsonc::from_str(content).or_else(|e| {
            debug!("{:?} is not JSON ({}), trying YAML", path, e);
            serde_yaml::from_str(content).with_context(|| format!("Could not parse {:?}", path))
        }),
        ConfigFormat::JavaScript => Ok(Value::Null),
    }
}

/// `extends` / `plugins` as a list, accepting a single string
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Apply ESLint's package naming convention for `prefix`
/// (`eslint-config` or `eslint-plugin`)
fn normalize_package_name(name: &str, prefix: &str) -> String {
    if let Some(rest) = name.strip_prefix('@') {
        let (scope, sub) = match rest.split_once('/') {
            Some((scope, sub)) => (scope, sub),
            None => (rest, ""),
        };
        return if sub.is_empty() {
            format!("@{}/{}", scope, prefix)
        } else if sub.starts_with(prefix) {
            format!("@{}/{}", scope, sub)
        } else {
            format!("@{}/{}-{}", scope, prefix, sub)
        };
    }
    if name.starts_with(&format!("{}-", prefix)) {
        name.to_string()
    } else {
        format!("{}-{}", prefix, name)
    }
}

/// Package providing a plugin, e.g. `react` -> `eslint-plugin-react`,
/// `@typescript-eslint` -> `@typescript-eslint/eslint-plugin`
pub fn plugin_package(plugin: &str) -> String {
    normalize_package_name(plugin, "eslint-plugin")
}

/// What an `extends` entry points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "package", rename_all = "snake_case")]
pub enum ExtendsTarget {
    /// `eslint:recommended`, `eslint:all`
    Builtin,
    /// A relative or absolute path
    Local,
    Package(String),
}

pub fn extends_target(entry: &str) -> ExtendsTarget {
    if entry.starts_with("eslint:") {
        return ExtendsTarget::Builtin;
    }
    if entry.starts_with('.') || entry.starts_with('/') {
        return ExtendsTarget::Local;
    }
    if let Some(rest) = entry.strip_prefix("plugin:") {
        // plugin:<plugin>/<config>, the plugin itself may be scoped
        let plugin = rest.rsplit_once('/').map_or(rest, |(plugin, _)| plugin);
        return ExtendsTarget::Package(plugin_package(plugin));
    }

    let segments: Vec<&str> = entry.split('/').collect();
    let name = if entry.starts_with('@') {
        segments.iter().take(2).copied().collect::<Vec<_>>().join("/")
    } else {
        segments[0].to_string()
    };
    ExtendsTarget::Package(normalize_package_name(&name, "eslint-config"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedEntry {
    pub entry: String,
    pub target: ExtendsTarget,
    pub installed: bool,
}

fn resolve_entry(entry: String, target: ExtendsTarget, packages: &DependencyMap) -> ResolvedEntry {
    let installed = match &target {
        ExtendsTarget::Package(package) => packages.contains_key(package),
        _ => true,
    };
    ResolvedEntry {
        entry,
        target,
        installed,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EslintReport {
    pub config: Option<ConfigLocation>,
    /// Declared ESLint-related packages
    pub packages: DependencyMap,
    pub eslint_version: Option<String>,
    pub eslint_major: Option<u64>,
    /// `false` for JavaScript configs
    pub parsed: bool,
    pub extends: Vec<ResolvedEntry>,
    pub plugins: Vec<ResolvedEntry>,
}

impl EslintReport {
    pub fn missing_packages(&self) -> Vec<&str> {
        self.extends
            .iter()
            .chain(self.plugins.iter())
            .filter(|e| !e.installed)
            .filter_map(|e| match &e.target {
                ExtendsTarget::Package(package) => Some(package.as_str()),
                _ => None,
            })
            .collect()
    }

    fn should_migrate(&self) -> bool {
        self.eslint_major.is_some_and(|major| major >= 9)
            && self.config.as_ref().is_some_and(|c| c.kind != ConfigKind::Flat)
    }
}

pub fn resolve_eslint(project: &Project) -> Result<EslintReport> {
    let all = project.manifest.all_dependencies();
    let packages: DependencyMap = all
        .into_iter()
        .filter(|(name, _)| name.contains("eslint"))
        .collect();
    let eslint_version = packages.get("eslint").cloned();
    let eslint_major = eslint_version.as_deref().and_then(spec_major);

    let config = find_config(project);
    let mut report = EslintReport {
        config: config.clone(),
        packages,
        eslint_version,
        eslint_major,
        parsed: false,
        extends: Vec::new(),
        plugins: Vec::new(),
    };

    let Some(location) = config else {
        return Ok(report);
    };
    debug!("Using ESLint config {}", location.file);

    if let Some(value) = load_config(project, &location)? {
        report.parsed = true;
        report.extends = string_list(value.get("extends"))
            .into_iter()
            .map(|entry| {
                let target = extends_target(&entry);
                resolve_entry(entry, target, &report.packages)
            })
            .collect();
        report.plugins = string_list(value.get("plugins"))
            .into_iter()
            .map(|entry| {
                let target = ExtendsTarget::Package(plugin_package(&entry));
                resolve_entry(entry, target, &report.packages)
            })
            .collect();
    }

    Ok(report)
}

fn entry_finding(entry: &ResolvedEntry) -> Finding {
    match &entry.target {
        ExtendsTarget::Builtin => Finding::pass(format!("{} (built-in)", entry.entry)),
        ExtendsTarget::Local => Finding::info(format!("{} (local file)", entry.entry)),
        ExtendsTarget::Package(package) if entry.installed => {
            Finding::pass(format!("{} ({})", entry.entry, package))
        }
        ExtendsTarget::Package(package) => Finding::fail(entry.entry.clone())
            .detail(format!("Install: npm install -D {}", package)),
    }
}

impl IntoReport for EslintReport {
    fn to_report(&self) -> Report {
        let report = Report::new("ESLint Config Resolver");

        let Some(config) = &self.config else {
            return report.section(Section::new("Config").with(
                Finding::fail("No ESLint configuration found").details([
                    "Looking for:",
                    "• eslint.config.js / .mjs / .cjs / .ts (ESLint 9+ flat config)",
                    "• .eslintrc.js, .eslintrc.cjs, .eslintrc.yaml, .eslintrc.yml, .eslintrc.json, .eslintrc",
                    "• eslintConfig in package.json",
                ]),
            ));
        };

        let mut report = report.section(
            Section::new("Config").with(Finding::pass(format!("Found ESLint config: {}", config.file))),
        );

        let mut installed = Section::new("[1/3] Checking installed ESLint packages...");
        if self.packages.is_empty() {
            installed.push(
                Finding::fail("No ESLint packages found in package.json")
                    .detail("Install: npm install -D eslint"),
            );
            return report.section(installed);
        }
        installed.push(
            Finding::pass(format!(
                "Found {} ESLint-related package(s)",
                self.packages.len()
            ))
            .details(
                self.packages
                    .iter()
                    .map(|(name, version)| format!("• {}: {}", name, version)),
            ),
        );
        report = report.section(installed);

        if let Some(version) = &self.eslint_version {
            let mut section = Section::new(format!("[2/3] ESLint version: {}", version));
            match self.eslint_major {
                Some(major) if major >= 9 => {
                    section.push(Finding::info("ESLint 9+ uses flat config (eslint.config.js)"));
                    if self.should_migrate() {
                        section.push(
                            Finding::warn("Consider migrating to flat config format")
                                .detail(format!("See: {}", MIGRATION_GUIDE)),
                        );
                    }
                }
                Some(_) if config.kind == ConfigKind::Flat => {
                    section.push(Finding::warn(
                        "Flat config on ESLint < 9 requires ESLINT_USE_FLAT_CONFIG=true (8.21+)",
                    ));
                }
                Some(_) => {
                    section.push(Finding::info("Using traditional config format"));
                }
                None => {
                    section.push(Finding::skip("Could not determine the ESLint major version"));
                }
            }
            report = report.section(section);
        }

        let mut entries = Section::new("[3/3] Checking extends and plugins...");
        if !self.parsed {
            entries.push(
                Finding::warn(format!("Could not statically parse {}", config.file))
                    .detail("Manually verify extends and plugins match installed packages"),
            );
        } else if self.extends.is_empty() && self.plugins.is_empty() {
            entries.push(Finding::info("No extends or plugins configured"));
        } else {
            for entry in &self.extends {
                entries.push(entry_finding(entry).detail("(extends)"));
            }
            for entry in &self.plugins {
                entries.push(entry_finding(entry).detail("(plugin)"));
            }
        }
        report = report.section(entries);

        let missing = self.missing_packages();
        if !missing.is_empty() {
            report = report.recommend(format!("Install missing packages: npm install -D {}", missing.join(" ")));
        }
        if self.should_migrate() {
            report = report.recommend(format!("Migrate to flat config: {}", MIGRATION_GUIDE));
        }
        report.recommend_all([
            "Keep ESLint and plugins up to date",
            "Use typescript-eslint for TypeScript projects",
            "Run: npx eslint --print-config <file> to see the resolved config",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::write;
    use tempfile::tempdir;

    #[test]
    fn test_plugin_package_names() {
        assert_eq!(plugin_package("react"), "eslint-plugin-react");
        assert_eq!(plugin_package("eslint-plugin-import"), "eslint-plugin-import");
        assert_eq!(plugin_package("@typescript-eslint"), "@typescript-eslint/eslint-plugin");
        assert_eq!(plugin_package("@scope/foo"), "@scope/eslint-plugin-foo");
        assert_eq!(plugin_package("@scope/eslint-plugin"), "@scope/eslint-plugin");
    }

    #[test]
    fn test_extends_targets() {
        assert_eq!(extends_target("eslint:recommended"), ExtendsTarget::Builtin);
        assert_eq!(extends_target("./base.js"), ExtendsTarget::Local);
        assert_eq!(
            extends_target("airbnb/hooks"),
            ExtendsTarget::Package("eslint-config-airbnb".into())
        );
        assert_eq!(
            extends_target("plugin:react/recommended"),
            ExtendsTarget::Package("eslint-plugin-react".into())
        );
        assert_eq!(
            extends_target("plugin:@typescript-eslint/recommended"),
            ExtendsTarget::Package("@typescript-eslint/eslint-plugin".into())
        );
        assert_eq!(
            extends_target("@vue/typescript"),
            ExtendsTarget::Package("@vue/eslint-config-typescript".into())
        );
        assert_eq!(
            extends_target("@company"),
            ExtendsTarget::Package("@company/eslint-config".into())
        );
        assert_eq!(
            extends_target("eslint-config-prettier"),
            ExtendsTarget::Package("eslint-config-prettier".into())
        );
    }

    #[test]
    fn test_legacy_json_config_with_missing_packages() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{"devDependencies":{"eslint":"^9.1.0","eslint-plugin-react":"^7.34.0"}}"#,
        );
        write(
            temp.path(),
            ".eslintrc.json",
            r#"{
                // legacy config
                "extends": ["eslint:recommended", "plugin:react/recommended", "prettier"],
                "plugins": ["react", "@typescript-eslint"],
            }"#,
        );
        let project = Project::load(temp.path()).unwrap();
        let report = resolve_eslint(&project).unwrap();

        assert_eq!(report.config.as_ref().unwrap().kind, ConfigKind::Legacy);
        assert_eq!(report.eslint_major, Some(9));
        assert_eq!(
            report.missing_packages(),
            ["eslint-config-prettier", "@typescript-eslint/eslint-plugin"]
        );

        let text = report.to_report().to_string();
        assert!(text.contains("Consider migrating to flat config format"));
        assert!(text.contains("Install: npm install -D eslint-config-prettier"));
    }

    #[test]
    fn test_yaml_and_package_json_configs() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{"devDependencies":{"eslint":"^8.57.0"},"eslintConfig":{"extends":"react-app"}}"#,
        );
        let project = Project::load(temp.path()).unwrap();
        let report = resolve_eslint(&project).unwrap();
        assert_eq!(report.config.as_ref().unwrap().kind, ConfigKind::PackageJson);
        assert_eq!(report.extends[0].target, ExtendsTarget::Package("eslint-config-react-app".into()));

        write(temp.path(), ".eslintrc.yml", "extends:\n  - standard\nplugins: [node]\n");
        let report = resolve_eslint(&project).unwrap();
        assert_eq!(report.config.as_ref().unwrap().file, ".eslintrc.yml");
        assert_eq!(report.plugins[0].target, ExtendsTarget::Package("eslint-plugin-node".into()));
    }

    #[test]
    fn test_flat_config_is_not_parsed() {
        let temp = tempdir().unwrap();
        write(temp.path(), "package.json", r#"{"devDependencies":{"eslint":"^9.0.0"}}"#);
        write(temp.path(), "eslint.config.mjs", "export default [];");
        let project = Project::load(temp.path()).unwrap();
        let report = resolve_eslint(&project).unwrap();
        assert!(!report.parsed);
        assert!(!report.should_migrate());
        assert!(report
            .to_report()
            .to_string()
            .contains("Could not statically parse eslint.config.mjs"));
    }

    #[test]
    fn test_no_config() {
        let temp = tempdir().unwrap();
        write(temp.path(), "package.json", "{}");
        let project = Project::load(temp.path()).unwrap();
        let report = resolve_eslint(&project).unwrap();
        assert!(report.config.is_none());
        assert!(report.to_report().has_failures());
    }
}
