//! Monorepo workspace consistency checks
//!
//! Supports npm and Yarn workspaces (`workspaces` in package.json), pnpm
//! workspaces (`pnpm-workspace.yaml`) and Lerna (`lerna.json`).

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DisplaySettings;
use crate::constants::lockfiles;
use crate::manifest::{DependencyMap, PackageJson};
use crate::paths::display_relative;
use crate::report::{Finding, IntoReport, Report, Section};

const LERNA_FILE: &str = "lerna.json";
const PNPM_WORKSPACE_FILE: &str = "pnpm-workspace.yaml";
const USED_BY_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MonorepoTool {
    NpmWorkspaces,
    YarnWorkspaces,
    PnpmWorkspaces,
    Lerna,
}

impl fmt::Display for MonorepoTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonorepoTool::NpmWorkspaces => "npm-workspaces",
            MonorepoTool::YarnWorkspaces => "yarn-workspaces",
            MonorepoTool::PnpmWorkspaces => "pnpm-workspaces",
            MonorepoTool::Lerna => "lerna",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Default, Deserialize)]
struct LernaConfig {
    #[serde(default)]
    packages: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PnpmWorkspace {
    #[serde(default)]
    packages: Vec<String>,
}

/// Workspace tools configured in `dir`. A `yarn.lock` turns npm
/// workspaces into Yarn workspaces.
pub fn detect_tools(dir: &Path, manifest: Option<&PackageJson>) -> Vec<MonorepoTool> {
    let mut tools = Vec::new();

    if manifest.is_some_and(|m| m.workspaces.is_some()) {
        if dir.join(lockfiles::YARN).is_file() {
            tools.push(MonorepoTool::YarnWorkspaces);
        } else {
            tools.push(MonorepoTool::NpmWorkspaces);
        }
    }
    if dir.join(LERNA_FILE).is_file() {
        tools.push(MonorepoTool::Lerna);
    }
    if dir.join(PNPM_WORKSPACE_FILE).is_file() {
        tools.push(MonorepoTool::PnpmWorkspaces);
    }
    tools
}

/// Workspace globs declared for `tool`
pub fn workspace_patterns(
    dir: &Path,
    tool: MonorepoTool,
    manifest: Option<&PackageJson>,
) -> Result<Vec<String>> {
    match tool {
        MonorepoTool::NpmWorkspaces | MonorepoTool::YarnWorkspaces => Ok(manifest
            .and_then(|m| m.workspaces.as_ref())
            .map(|w| w.patterns().to_vec())
            .unwrap_or_default()),
        MonorepoTool::Lerna => {
            let path = dir.join(LERNA_FILE);
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            let config: LernaConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", path))?;
            Ok(config
                .packages
                .unwrap_or_else(|| vec!["packages/*".to_string()]))
        }
        MonorepoTool::PnpmWorkspaces => {
            let path = dir.join(PNPM_WORKSPACE_FILE);
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            if content.trim().is_empty() {
                return Ok(Vec::new());
            }
            let workspace: PnpmWorkspace = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", path))?;
            Ok(workspace.packages)
        }
    }
}

/// Expand workspace globs to directories holding a package.json.
/// Patterns starting with `!` exclude matches.
pub fn expand_patterns(dir: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
    let (excludes, includes): (Vec<&String>, Vec<&String>) =
        patterns.iter().partition(|p| p.starts_with('!'));

    let excludes: Vec<glob::Pattern> = excludes
        .into_iter()
        .filter_map(|p| {
            let pattern = normalize_pattern(p.trim_start_matches('!'));
            match glob::Pattern::new(pattern) {
                Ok(compiled) => Some(compiled),
                Err(e) => {
                    warn!("Ignoring invalid exclusion '{}': {}", p, e);
                    None
                }
            }
        })
        .collect();

    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut found = BTreeSet::new();

    for pattern in includes {
        let full = format!("{}/{}", base, normalize_pattern(pattern));
        let entries = glob::glob(&full)
            .with_context(|| format!("Invalid workspace pattern '{}'", pattern))?;

        for entry in entries.flatten() {
            if !entry.join("package.json").is_file() {
                continue;
            }
            let relative = display_relative(&entry, dir);
            if relative.split('/').any(|part| part == "node_modules") {
                continue;
            }
            if excludes.iter().any(|p| p.matches(&relative)) {
                debug!("Workspace {} excluded", relative);
                continue;
            }
            found.insert(entry);
        }
    }

    Ok(found.into_iter().collect())
}

fn normalize_pattern(pattern: &str) -> &str {
    pattern.trim_start_matches("./").trim_end_matches('/')
}

/// A package inside the monorepo
#[derive(Debug, Clone, Serialize)]
pub struct WorkspacePackage {
    pub name: String,
    pub version: String,
    /// Directory relative to the monorepo root
    pub path: String,
    /// dependencies and devDependencies merged
    pub dependencies: DependencyMap,
}

impl WorkspacePackage {
    pub fn load(dir: &Path, root: &Path) -> Result<Self> {
        let manifest = PackageJson::load(dir)?;
        Ok(Self {
            name: manifest.name.clone().unwrap_or_else(|| "unknown".to_string()),
            version: manifest
                .version
                .clone()
                .unwrap_or_else(|| "0.0.0".to_string()),
            path: display_relative(dir, root),
            dependencies: manifest.all_dependencies(),
        })
    }
}

/// The same dependency declared with different specs across workspaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionMismatch {
    pub dependency: String,
    /// spec -> workspace packages using it
    pub versions: BTreeMap<String, Vec<String>>,
}

pub fn find_version_mismatches(packages: &[WorkspacePackage]) -> Vec<VersionMismatch> {
    let mut by_dependency: BTreeMap<&str, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for package in packages {
        for (dependency, spec) in &package.dependencies {
            by_dependency
                .entry(dependency)
                .or_default()
                .entry(spec.clone())
                .or_default()
                .push(package.name.clone());
        }
    }

    by_dependency
        .into_iter()
        .filter(|(_, versions)| versions.len() > 1)
        .map(|(dependency, versions)| VersionMismatch {
            dependency: dependency.to_string(),
            versions,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceIssueKind {
    /// `workspace:` protocol pointing at a package that is not in the repo
    MissingWorkspace,
    /// Internal package referenced by a registry range
    NonWorkspaceProtocol,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceIssue {
    pub kind: ReferenceIssueKind,
    pub package: String,
    pub dependency: String,
    pub spec: String,
}

impl ReferenceIssue {
    pub fn message(&self) -> String {
        match self.kind {
            ReferenceIssueKind::MissingWorkspace => format!(
                "References workspace package '{}' which doesn't exist",
                self.dependency
            ),
            ReferenceIssueKind::NonWorkspaceProtocol => format!(
                "Uses '{}' instead of 'workspace:*' for workspace package '{}'",
                self.spec, self.dependency
            ),
        }
    }
}

pub fn check_workspace_references(packages: &[WorkspacePackage]) -> Vec<ReferenceIssue> {
    let names: BTreeSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    let mut issues = Vec::new();

    for package in packages {
        for (dependency, spec) in &package.dependencies {
            let kind = if spec.starts_with("workspace:") {
                if names.contains(dependency.as_str()) {
                    continue;
                }
                ReferenceIssueKind::MissingWorkspace
            } else if names.contains(dependency.as_str()) && !spec.starts_with('*') {
                ReferenceIssueKind::NonWorkspaceProtocol
            } else {
                continue;
            };
            issues.push(ReferenceIssue {
                kind,
                package: package.name.clone(),
                dependency: dependency.clone(),
                spec: spec.clone(),
            });
        }
    }
    issues
}

/// A dependency edge that lies on a cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircularDependency {
    pub from: String,
    pub to: String,
    /// `from -> to -> ... -> from`
    pub cycle: Vec<String>,
}

/// Every internal edge `from -> to` where `to` can reach back to `from`
pub fn find_circular_dependencies(packages: &[WorkspacePackage]) -> Vec<CircularDependency> {
    let names: BTreeSet<&str> = packages.iter().map(|p| p.name.as_str()).collect();
    let graph: BTreeMap<&str, Vec<&str>> = packages
        .iter()
        .map(|package| {
            let edges = package
                .dependencies
                .keys()
                .map(String::as_str)
                .filter(|dep| names.contains(dep))
                .collect();
            (package.name.as_str(), edges)
        })
        .collect();

    let mut circular = Vec::new();
    for (from, edges) in &graph {
        for to in edges {
            if let Some(back) = shortest_path(&graph, to, from) {
                let mut cycle = vec![from.to_string()];
                cycle.extend(back.into_iter().map(str::to_string));
                circular.push(CircularDependency {
                    from: from.to_string(),
                    to: to.to_string(),
                    cycle,
                });
            }
        }
    }
    circular
}

/// Breadth-first path `start -> ... -> target`, inclusive
fn shortest_path<'a>(
    graph: &BTreeMap<&'a str, Vec<&'a str>>,
    start: &'a str,
    target: &str,
) -> Option<Vec<&'a str>> {
    let mut previous: BTreeMap<&'a str, &'a str> = BTreeMap::new();
    let mut seen: BTreeSet<&'a str> = BTreeSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(node) = queue.pop_front() {
        if node == target {
            let mut path = vec![node];
            let mut current = node;
            while let Some(&prev) = previous.get(current) {
                path.push(prev);
                current = prev;
            }
            path.reverse();
            return Some(path);
        }
        for &next in graph.get(node).into_iter().flatten() {
            if seen.insert(next) {
                previous.insert(next, node);
                queue.push_back(next);
            }
        }
    }
    None
}

#[derive(Debug, Clone, Serialize)]
pub struct MonorepoReport {
    pub tools: Vec<MonorepoTool>,
    pub packages: Vec<WorkspacePackage>,
    pub mismatches: Vec<VersionMismatch>,
    pub reference_issues: Vec<ReferenceIssue>,
    pub circular: Vec<CircularDependency>,
    #[serde(skip)]
    max_items: usize,
}

impl MonorepoReport {
    pub fn total_issues(&self) -> usize {
        self.mismatches.len() + self.reference_issues.len() + self.circular.len()
    }
}

/// Detect the workspace layout in `dir` and run every consistency check
pub fn check_monorepo(dir: &Path, display: &DisplaySettings) -> Result<MonorepoReport> {
    let manifest = match PackageJson::load(dir) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            debug!("No usable root package.json: {}", e);
            None
        }
    };

    let tools = detect_tools(dir, manifest.as_ref());
    let mut packages = Vec::new();

    if let Some(tool) = tools.first() {
        let patterns = workspace_patterns(dir, *tool, manifest.as_ref())?;
        debug!("Workspace patterns for {}: {:?}", tool, patterns);
        for package_dir in expand_patterns(dir, &patterns)? {
            match WorkspacePackage::load(&package_dir, dir) {
                Ok(package) => packages.push(package),
                Err(e) => warn!("Skipping workspace {:?}: {}", package_dir, e),
            }
        }
    }

    Ok(MonorepoReport {
        mismatches: find_version_mismatches(&packages),
        reference_issues: check_workspace_references(&packages),
        circular: find_circular_dependencies(&packages),
        tools,
        packages,
        max_items: display.max_items,
    })
}

fn used_by_line(spec: &str, used_by: &[String]) -> String {
    let shown = used_by
        .iter()
        .take(USED_BY_LIMIT)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    if used_by.len() > USED_BY_LIMIT {
        format!(
            "{} used by: {} ... and {} more",
            spec,
            shown,
            used_by.len() - USED_BY_LIMIT
        )
    } else {
        format!("{} used by: {}", spec, shown)
    }
}

impl IntoReport for MonorepoReport {
    fn to_report(&self) -> Report {
        let report = Report::new("Monorepo Dependency Checker");

        if self.tools.is_empty() {
            return report.section(
                Section::new("Detection").with(
                    Finding::fail("Not a monorepo or unsupported monorepo structure").details([
                        "Supported structures:",
                        "- npm workspaces (package.json with 'workspaces' field)",
                        "- Yarn workspaces (yarn.lock + workspaces in package.json)",
                        "- pnpm workspaces (pnpm-workspace.yaml)",
                        "- Lerna (lerna.json)",
                    ]),
                ),
            );
        }

        let tools: Vec<String> = self.tools.iter().map(ToString::to_string).collect();
        let mut detection = Section::new("Detection").with(Finding::pass(format!(
            "Detected monorepo type: {}",
            tools.join(", ")
        )));
        if self.packages.is_empty() {
            detection.push(Finding::fail("No workspace packages found"));
            return report.section(detection);
        }
        detection.push(
            Finding::info(format!(
                "Found {} workspace package(s)",
                self.packages.len()
            ))
            .details(
                self.packages
                    .iter()
                    .map(|p| format!("• {} (v{}) at {}", p.name, p.version, p.path)),
            ),
        );

        let mut mismatches = Section::new("[1] Checking for version mismatches across workspaces...");
        if self.mismatches.is_empty() {
            mismatches.push(Finding::pass("No version mismatches found"));
        } else {
            mismatches.push(Finding::warn(format!(
                "Found {} package(s) with version mismatches",
                self.mismatches.len()
            )));
            mismatches.push_limited(
                self.mismatches.iter().map(|m| {
                    Finding::warn(m.dependency.clone()).details(
                        m.versions
                            .iter()
                            .map(|(spec, used_by)| used_by_line(spec, used_by)),
                    )
                }),
                self.max_items,
                "packages with mismatches",
            );
        }

        let mut references = Section::new("[2] Checking workspace references...");
        if self.reference_issues.is_empty() {
            references.push(Finding::pass("No workspace reference issues found"));
        } else {
            references.push(Finding::warn(format!(
                "Found {} workspace reference issue(s)",
                self.reference_issues.len()
            )));
            references.push_limited(
                self.reference_issues
                    .iter()
                    .map(|i| Finding::warn(format!("{}: {}", i.package, i.message()))),
                self.max_items,
                "issues",
            );
        }

        let mut circular = Section::new("[3] Checking for circular dependencies...");
        if self.circular.is_empty() {
            circular.push(Finding::pass("No circular dependencies found"));
        } else {
            circular.push(Finding::warn(format!(
                "Found {} circular dependency edge(s)",
                self.circular.len()
            )));
            circular.push_limited(
                self.circular.iter().map(|c| {
                    Finding::fail(format!("{} -> {}", c.from, c.to))
                        .detail(format!("cycle: {}", c.cycle.join(" -> ")))
                }),
                self.max_items,
                "circular dependencies",
            );
        }

        let mut summary = Section::new("SUMMARY");
        if self.total_issues() == 0 {
            summary.push(Finding::pass("No issues found! Monorepo dependencies are clean."));
        } else {
            summary.push(Finding::warn(format!(
                "Found {} total issue(s)",
                self.total_issues()
            )));
        }

        let mut report = report
            .section(detection)
            .section(mismatches)
            .section(references)
            .section(circular)
            .section(summary);

        if !self.mismatches.is_empty() {
            report = report.recommend_all([
                "Use a single version across all workspaces for shared dependencies",
                "Add the dependency to the root package.json if used by multiple workspaces",
                "Consider the pnpm catalog feature for version management",
            ]);
        }
        if !self.reference_issues.is_empty() {
            report = report.recommend_all([
                "Use the 'workspace:*' protocol for workspace dependencies",
                "Ensure all referenced workspace packages exist, then reinstall",
            ]);
        }
        if !self.circular.is_empty() {
            report = report.recommend_all([
                "Break circular dependencies by moving shared code to a common package",
                "Consider restructuring package boundaries",
            ]);
        }
        report.recommend("Run dedupe: npm dedupe (or yarn dedupe / pnpm dedupe)")
    }
}
