//! `engines`, `os` and `cpu` validation
//!
//! Covers both the strict validator (`nodedoc engines`) and the quick Node.js
//! compatibility check (`nodedoc node-version`).

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use super::Project;
use crate::config::DisplaySettings;
use crate::manifest::PackageJson;
use crate::report::{Finding, IntoReport, Report, Section};
use crate::toolchain::{Platform, ToolVersions, TOOLS};
use crate::versions::{parse_version, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Valid,
    Invalid,
    NotInstalled,
    /// The requirement is not a valid range
    Unparseable,
    /// Not a tool nodedoc can probe (e.g. `vscode`)
    Unchecked,
}

/// One `engines` entry checked against the local toolchain
#[derive(Debug, Clone, Serialize)]
pub struct EngineCheck {
    pub engine: String,
    pub required: String,
    pub current: Option<String>,
    pub status: EngineStatus,
    pub fix: Vec<String>,
}

pub fn check_engine(engine: &str, required: &str, current: Option<&str>) -> EngineCheck {
    let mut check = EngineCheck {
        engine: engine.to_string(),
        required: required.to_string(),
        current: current.map(str::to_string),
        status: EngineStatus::Unchecked,
        fix: Vec::new(),
    };

    if !ToolVersions::is_known(engine) {
        return check;
    }

    let Ok(range) = Range::parse(required) else {
        check.status = EngineStatus::Unparseable;
        return check;
    };

    check.status = match current.and_then(parse_version) {
        None if current.is_none() => EngineStatus::NotInstalled,
        None => EngineStatus::Unparseable,
        Some(version) if range.satisfies(&version) => EngineStatus::Valid,
        Some(_) => EngineStatus::Invalid,
    };

    if matches!(check.status, EngineStatus::Invalid | EngineStatus::NotInstalled) {
        check.fix = suggest_fix(engine, required, &range);
    }
    check
}

fn suggest_fix(engine: &str, required: &str, range: &Range) -> Vec<String> {
    if engine == "node" {
        let Some(min) = range.min_version() else {
            return vec![format!("Install a Node.js version matching {}", required)];
        };
        return vec![
            format!("nvm install {}", min.major),
            format!("nvm use {}", min.major),
        ];
    }
    vec![format!("npm install -g {}@\"{}\"", engine, required)]
}

/// An `os` or `cpu` allow/deny list checked against the current platform
#[derive(Debug, Clone, Serialize)]
pub struct PlatformConstraint {
    pub field: String,
    pub current: String,
    pub allowed: Vec<String>,
    pub denied: Vec<String>,
    pub compatible: bool,
}

pub fn check_platform_list(field: &str, list: &[String], current: &str) -> PlatformConstraint {
    let (denied, allowed): (Vec<String>, Vec<String>) =
        list.iter().cloned().partition(|entry| entry.starts_with('!'));
    let denied: Vec<String> = denied
        .into_iter()
        .map(|entry| entry.trim_start_matches('!').to_string())
        .collect();

    let in_allowed = allowed.is_empty() || allowed.iter().any(|a| a == current);
    let in_denied = denied.iter().any(|d| d == current);

    PlatformConstraint {
        field: field.to_string(),
        current: current.to_string(),
        allowed,
        denied,
        compatible: in_allowed && !in_denied,
    }
}

/// An installed dependency whose own `engines` reject the local toolchain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEngineIssue {
    pub package: String,
    pub engine: String,
    pub required: String,
    pub current: String,
}

/// Scan `node_modules/<pkg>` and `node_modules/@scope/<pkg>` manifests.
/// Nested `node_modules` directories are not entered.
pub fn scan_dependency_engines(
    node_modules: &Path,
    tools: &ToolVersions,
) -> Vec<DependencyEngineIssue> {
    let mut issues = Vec::new();

    let walker = WalkDir::new(node_modules)
        .min_depth(2)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != "node_modules");

    for entry in walker.flatten() {
        if entry.file_name() != "package.json" || !entry.file_type().is_file() {
            continue;
        }
        // depth 3 only counts inside a scope directory
        if entry.depth() == 3 {
            let scoped = entry
                .path()
                .parent()
                .and_then(Path::parent)
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().starts_with('@'))
                .unwrap_or(false);
            if !scoped {
                continue;
            }
        }

        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        let Ok(manifest) = serde_json::from_str::<PackageJson>(&content) else {
            debug!("Skipping unreadable manifest {:?}", entry.path());
            continue;
        };

        for (engine, required) in &manifest.engines {
            let Some(current) = tools.get(engine) else {
                continue;
            };
            let check = check_engine(engine, required, Some(current));
            if check.status == EngineStatus::Invalid {
                issues.push(DependencyEngineIssue {
                    package: manifest.display_name().to_string(),
                    engine: engine.clone(),
                    required: required.clone(),
                    current: current.to_string(),
                });
            }
        }
    }

    issues
}

/// Full engine-strict validation
#[derive(Debug, Clone, Serialize)]
pub struct EnginesReport {
    pub project: String,
    pub version: String,
    pub platform: Platform,
    pub tools: ToolVersions,
    pub engines: Vec<EngineCheck>,
    pub os: Option<PlatformConstraint>,
    pub cpu: Option<PlatformConstraint>,
    pub node_modules_present: bool,
    pub dependency_issues: Vec<DependencyEngineIssue>,
    #[serde(skip)]
    max_items: usize,
}

pub fn validate_engines(
    project: &Project,
    tools: &ToolVersions,
    platform: &Platform,
    display: &DisplaySettings,
) -> EnginesReport {
    let manifest = &project.manifest;

    let engines = manifest
        .engines
        .iter()
        .map(|(engine, required)| check_engine(engine, required, tools.get(engine)))
        .collect();

    let os = (!manifest.os.is_empty())
        .then(|| check_platform_list("os", &manifest.os, &platform.os));
    let cpu = (!manifest.cpu.is_empty())
        .then(|| check_platform_list("cpu", &manifest.cpu, &platform.arch));

    let node_modules = project.path("node_modules");
    let node_modules_present = node_modules.is_dir();
    let dependency_issues = if node_modules_present {
        scan_dependency_engines(&node_modules, tools)
    } else {
        Vec::new()
    };

    EnginesReport {
        project: manifest.display_name().to_string(),
        version: manifest.display_version().to_string(),
        platform: platform.clone(),
        tools: tools.clone(),
        engines,
        os,
        cpu,
        node_modules_present,
        dependency_issues,
        max_items: display.max_items,
    }
}

fn installed(version: Option<&str>) -> String {
    version.unwrap_or("Not installed").to_string()
}

fn engine_finding(check: &EngineCheck) -> Finding {
    let current = installed(check.current.as_deref());
    let head = format!("{}: requires {}, have {}", check.engine, check.required, current);
    let finding = match check.status {
        EngineStatus::Valid => Finding::pass(format!("{} (VALID)", head)),
        EngineStatus::Invalid => Finding::fail(format!("{} (INVALID)", head)),
        EngineStatus::NotInstalled => Finding::fail(format!("{} (NOT INSTALLED)", head)),
        EngineStatus::Unparseable => {
            Finding::warn(format!("{}: could not parse '{}'", check.engine, check.required))
        }
        EngineStatus::Unchecked => Finding::skip(format!(
            "{}: {} (not checked)",
            check.engine, check.required
        )),
    };
    finding.details(check.fix.iter().map(|f| format!("Fix: {}", f)))
}

fn constraint_finding(constraint: &PlatformConstraint) -> Finding {
    if constraint.compatible {
        return Finding::pass(format!(
            "Current {} '{}' is compatible",
            constraint.field, constraint.current
        ));
    }
    if constraint.denied.contains(&constraint.current) {
        return Finding::fail(format!(
            "Current {} '{}' is in denied list",
            constraint.field, constraint.current
        ));
    }
    Finding::fail(format!(
        "Current {} '{}' not in allowed list: {}",
        constraint.field,
        constraint.current,
        constraint.allowed.join(", ")
    ))
}

impl IntoReport for EnginesReport {
    fn to_report(&self) -> Report {
        let tools = &self.tools;
        let mut report = Report::new("Engine Strict Validator")
            .line(format!("Project: {}", self.project))
            .line(format!("Version: {}", self.version))
            .section(
                Section::new("Current Environment")
                    .with(Finding::info(format!("Platform: {}", self.platform.os)))
                    .with(Finding::info(format!("Architecture: {}", self.platform.arch)))
                    .with(Finding::info(format!("Node.js: {}", installed(tools.node.as_deref()))))
                    .with(Finding::info(format!("npm: {}", installed(tools.npm.as_deref()))))
                    .with(Finding::info(format!("Yarn: {}", installed(tools.yarn.as_deref()))))
                    .with(Finding::info(format!("pnpm: {}", installed(tools.pnpm.as_deref())))),
            );

        let mut engines = Section::new("ENGINES VALIDATION");
        if self.engines.is_empty() {
            engines.push(Finding::pass("No engines field specified - any version accepted"));
        } else {
            for check in &self.engines {
                engines.push(engine_finding(check));
            }
        }
        report = report.section(engines);

        let constraints: Vec<&PlatformConstraint> =
            self.os.iter().chain(self.cpu.iter()).collect();
        if !constraints.is_empty() {
            let mut section = Section::new("Platform Restrictions");
            for constraint in constraints {
                section.push(constraint_finding(constraint));
            }
            report = report.section(section);
        }

        let mut deps = Section::new("CHECKING DEPENDENCIES' ENGINE REQUIREMENTS");
        if !self.node_modules_present {
            deps.push(Finding::warn("node_modules not found - run npm install first"));
        } else if self.dependency_issues.is_empty() {
            deps.push(Finding::pass(
                "All installed dependencies compatible with current environment",
            ));
        } else {
            deps.push(Finding::warn(format!(
                "Found {} package(s) with engine mismatches",
                self.dependency_issues.len()
            )));
            deps.push_limited(
                self.dependency_issues.iter().map(|issue| {
                    Finding::warn(issue.package.clone()).detail(format!(
                        "{}: requires {}, have {}",
                        issue.engine, issue.required, issue.current
                    ))
                }),
                self.max_items,
                "packages",
            );
        }
        report = report.section(deps);

        if !self.engines.is_empty() {
            report = report
                .recommend("Add .npmrc file with: engine-strict=true")
                .recommend("Or run: npm config set engine-strict true (blocks installs when engines don't match)");
        }
        report.recommend("Manage Node versions with nvm (https://github.com/nvm-sh/nvm), volta (https://volta.sh/) or fnm (https://github.com/Schniz/fnm)")
    }
}

/// Quick Node.js compatibility check
#[derive(Debug, Clone, Serialize)]
pub struct NodeVersionReport {
    pub project: String,
    pub version: String,
    pub tools: ToolVersions,
    pub node: Option<EngineCheck>,
    pub managers: Vec<EngineCheck>,
    pub expo_sdk: Option<String>,
}

pub fn check_node_version(project: &Project, tools: &ToolVersions) -> NodeVersionReport {
    let engines = &project.manifest.engines;

    let node = engines
        .get("node")
        .map(|required| check_engine("node", required, tools.node.as_deref()));

    let managers = TOOLS
        .iter()
        .filter(|tool| **tool != "node")
        .filter_map(|tool| {
            engines
                .get(*tool)
                .map(|required| check_engine(tool, required, tools.get(tool)))
        })
        .collect();

    NodeVersionReport {
        project: project.manifest.display_name().to_string(),
        version: project.manifest.display_version().to_string(),
        tools: tools.clone(),
        node,
        managers,
        expo_sdk: project.manifest.dependencies.get("expo").cloned(),
    }
}

impl IntoReport for NodeVersionReport {
    fn to_report(&self) -> Report {
        let tools = &self.tools;
        let mut current = Section::new("Toolchain");
        match &tools.node {
            Some(node) => current.push(Finding::info(format!("Current Node.js version: v{}", node))),
            None => current.push(Finding::fail("Could not determine Node.js version")),
        };
        current.push(Finding::info(format!(
            "npm version: {}",
            tools.npm.as_deref().unwrap_or("not installed")
        )));
        for (name, version) in [("yarn", &tools.yarn), ("pnpm", &tools.pnpm)] {
            if let Some(version) = version {
                current.push(Finding::info(format!("{} version: {}", name, version)));
            }
        }

        let mut engines = Section::new("Required engines from package.json");
        if self.node.is_none() && self.managers.is_empty() {
            engines.push(
                Finding::pass("No engines field specified in package.json")
                    .detail("Any Node.js version can be used"),
            );
        }
        if let Some(node) = &self.node {
            engines.push(engine_finding(node));
        }
        for manager in &self.managers {
            let mut finding = engine_finding(manager);
            if manager.status == EngineStatus::NotInstalled && manager.engine != "npm" {
                finding = finding.detail(format!("Install with: npm install -g {}", manager.engine));
            }
            engines.push(finding);
        }

        let mut info = Section::new("Additional Information")
            .with(Finding::info(format!("Project: {}", self.project)))
            .with(Finding::info(format!("Version: {}", self.version)));
        if let Some(expo) = &self.expo_sdk {
            info.push(
                Finding::info(format!("Expo SDK detected: {}", expo))
                    .detail("Run 'npx expo-doctor' for Expo-specific checks"),
            );
        }

        Report::new("Node.js Version Compatibility Check")
            .section(current)
            .section(engines)
            .section(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::write;
    use tempfile::tempdir;

    fn tools() -> ToolVersions {
        ToolVersions {
            node: Some("20.11.1".into()),
            npm: Some("10.2.4".into()),
            yarn: None,
            pnpm: Some("8.15.0".into()),
        }
    }

    #[test]
    fn test_check_engine_statuses() {
        assert_eq!(
            check_engine("node", ">=18", Some("20.11.1")).status,
            EngineStatus::Valid
        );

        let invalid = check_engine("node", "^16.14.0", Some("20.11.1"));
        assert_eq!(invalid.status, EngineStatus::Invalid);
        assert_eq!(invalid.fix, ["nvm install 16", "nvm use 16"]);

        let missing = check_engine("yarn", ">=1.22", None);
        assert_eq!(missing.status, EngineStatus::NotInstalled);
        assert_eq!(missing.fix, ["npm install -g yarn@\">=1.22\""]);

        assert_eq!(
            check_engine("node", "lts", Some("20.0.0")).status,
            EngineStatus::Unparseable
        );
        assert_eq!(
            check_engine("vscode", "^1.80.0", None).status,
            EngineStatus::Unchecked
        );
    }

    #[test]
    fn test_platform_lists() {
        let list = vec!["darwin".to_string(), "linux".to_string()];
        assert!(check_platform_list("os", &list, "linux").compatible);
        assert!(!check_platform_list("os", &list, "win32").compatible);

        let deny = vec!["!win32".to_string()];
        let constraint = check_platform_list("os", &deny, "win32");
        assert!(!constraint.compatible);
        assert_eq!(constraint.denied, ["win32"]);
        assert!(check_platform_list("os", &deny, "darwin").compatible);
    }

    #[test]
    fn test_scan_dependency_engines() {
        let temp = tempdir().unwrap();
        let nm = temp.path().join("node_modules");
        write(
            &nm,
            "old-lib/package.json",
            r#"{"name":"old-lib","engines":{"node":"^14"}}"#,
        );
        write(
            &nm,
            "@scope/modern/package.json",
            r#"{"name":"@scope/modern","engines":{"node":">=18"}}"#,
        );
        write(
            &nm,
            "@scope/strict/package.json",
            r#"{"name":"@scope/strict","engines":{"pnpm":">=9"}}"#,
        );
        // Nested installs and package subfolders are ignored
        write(
            &nm,
            "old-lib/node_modules/inner/package.json",
            r#"{"name":"inner","engines":{"node":"^12"}}"#,
        );
        write(
            &nm,
            "old-lib/lib/package.json",
            r#"{"name":"sub","engines":{"node":"^12"}}"#,
        );

        let issues = scan_dependency_engines(&nm, &tools());
        let names: Vec<&str> = issues.iter().map(|i| i.package.as_str()).collect();
        assert_eq!(names, ["@scope/strict", "old-lib"]);
    }

    #[test]
    fn test_validate_engines_report() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{"name":"app","engines":{"node":">=22","npm":">=9"},"os":["!linux"]}"#,
        );
        let project = Project::load(temp.path()).unwrap();
        let platform = Platform {
            os: "linux".into(),
            arch: "x64".into(),
        };

        let result = validate_engines(&project, &tools(), &platform, &DisplaySettings::default());
        assert_eq!(result.engines.len(), 2);
        assert!(!result.os.as_ref().unwrap().compatible);
        assert!(!result.node_modules_present);

        let report = result.to_report();
        assert!(report.has_failures());
        let text = report.to_string();
        assert!(text.contains("node: requires >=22, have 20.11.1 (INVALID)"));
        assert!(text.contains("Fix: nvm install 22"));
        assert!(text.contains("is in denied list"));
        assert!(text.contains("engine-strict=true"));
    }

    #[test]
    fn test_node_version_report() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{"name":"app","engines":{"node":"^20","yarn":"^1.22"},"dependencies":{"expo":"~50.0.0"}}"#,
        );
        let project = Project::load(temp.path()).unwrap();
        let result = check_node_version(&project, &tools());

        assert_eq!(result.node.as_ref().unwrap().status, EngineStatus::Valid);
        assert_eq!(result.managers.len(), 1);
        assert_eq!(result.managers[0].status, EngineStatus::NotInstalled);
        assert_eq!(result.expo_sdk.as_deref(), Some("~50.0.0"));

        let text = result.to_report().to_string();
        assert!(text.contains("Current Node.js version: v20.11.1"));
        assert!(text.contains("Install with: npm install -g yarn"));
        assert!(text.contains("Expo SDK detected: ~50.0.0"));
    }
}
