//! Whole-project diagnosis
//!
//! Runs the quick checks in order (manifest, lock file, Node.js, package
//! managers, node_modules, Expo, TypeScript, ESLint), collects issues with
//! their fixes, and suggests the focused `nodedoc` commands to run next.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use super::engines::{check_engine, EngineStatus};
use super::eslint::find_config;
use super::tsconfig::DEFAULT_TSCONFIG;
use super::Project;
use crate::config::Settings;
use crate::lockfile::LockfileKind;
use crate::process::CommandRunner;
use crate::report::{Finding, IntoReport, Report, Section};
use crate::toolchain::ToolVersions;

/// A config file alongside the package that uses it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolConfig {
    pub config: Option<String>,
    /// Declared version spec of the tool itself
    pub declared: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExpoCheck {
    NotExpo,
    /// `checks.run_expo_doctor = false`
    Skipped { sdk: String },
    Clean { sdk: String },
    Issues { sdk: String, output: String },
    Unavailable { sdk: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub project: String,
    pub version: String,
    pub package_manager: Option<LockfileKind>,
    pub tools: ToolVersions,
    pub node_required: Option<String>,
    pub node_satisfied: Option<bool>,
    /// Approximate number of installed top-level packages
    pub installed_packages: Option<usize>,
    pub expo: ExpoCheck,
    pub typescript: ToolConfig,
    pub eslint: ToolConfig,
    pub react_native: bool,
    pub workspaces: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnoseReport {
    /// Why diagnosis stopped at package.json
    pub manifest_error: Option<String>,
    pub diagnosis: Option<Diagnosis>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub follow_up: Vec<String>,
}

/// Count directories in node_modules, looking one level into `@scope` dirs
pub fn count_installed_packages(node_modules: &Path) -> Option<usize> {
    let entries = fs::read_dir(node_modules).ok()?;
    let mut count = 0;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }
        if name.starts_with('@') {
            count += fs::read_dir(entry.path())
                .map(|scoped| scoped.flatten().filter(|e| e.path().is_dir()).count())
                .unwrap_or(0);
        } else {
            count += 1;
        }
    }
    Some(count)
}

async fn run_expo_doctor(project: &Project, runner: &dyn CommandRunner, settings: &Settings) -> ExpoCheck {
    let Some(sdk) = project.manifest.dependency_spec("expo").map(str::to_string) else {
        return ExpoCheck::NotExpo;
    };
    if !settings.checks.run_expo_doctor {
        return ExpoCheck::Skipped { sdk };
    }

    info!("Running npx expo-doctor");
    match runner.run("npx", &["expo-doctor"], &project.dir).await {
        Ok(output) if output.success() => ExpoCheck::Clean { sdk },
        Ok(output) => ExpoCheck::Issues {
            sdk,
            output: if output.stdout.trim().is_empty() {
                output.stderr
            } else {
                output.stdout
            },
        },
        Err(e) => ExpoCheck::Unavailable {
            sdk,
            error: e.to_string(),
        },
    }
}

pub async fn diagnose(dir: &Path, runner: &dyn CommandRunner, settings: &Settings) -> DiagnoseReport {
    let project = match Project::load(dir) {
        Ok(project) => project,
        Err(e) => {
            return DiagnoseReport {
                manifest_error: Some(format!("{:#}", e)),
                diagnosis: None,
                issues: vec!["Invalid or missing package.json".to_string()],
                recommendations: Vec::new(),
                follow_up: Vec::new(),
            }
        }
    };
    let manifest = &project.manifest;
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let package_manager = LockfileKind::detect(dir).map(|(kind, _)| kind);
    let manager = package_manager.map(|k| k.manager()).unwrap_or("npm");
    if package_manager.is_none() {
        issues.push("No lock file present".to_string());
    }

    let tools = ToolVersions::detect(runner, dir).await;
    let node_required = manifest.engines.get("node").cloned();
    let mut node_satisfied = None;
    match (&tools.node, &node_required) {
        (None, _) => issues.push("Node.js not installed".to_string()),
        (Some(node), Some(required)) => {
            let check = check_engine("node", required, Some(node));
            if check.status == EngineStatus::Invalid {
                issues.push(format!("Node.js v{} does not satisfy engines.node {}", node, required));
                if !check.fix.is_empty() {
                    recommendations.push(format!("Run: {}", check.fix.join(" && ")));
                }
            }
            node_satisfied = match check.status {
                EngineStatus::Valid => Some(true),
                EngineStatus::Invalid => Some(false),
                _ => None,
            };
        }
        (Some(_), None) => {}
    }

    let installed_packages = count_installed_packages(&project.path("node_modules"));
    if installed_packages.is_none() {
        issues.push("Dependencies not installed".to_string());
        recommendations.push(format!("Run: {} install", manager));
    }

    let expo = run_expo_doctor(&project, runner, settings).await;
    if matches!(expo, ExpoCheck::Issues { .. }) {
        issues.push("Expo dependency issues detected".to_string());
        recommendations.push("Run: npx expo install --fix".to_string());
    }

    let typescript = ToolConfig {
        config: project
            .has_file(DEFAULT_TSCONFIG)
            .then(|| DEFAULT_TSCONFIG.to_string()),
        declared: manifest.dependency_spec("typescript").map(str::to_string),
    };
    if typescript.config.is_some() && typescript.declared.is_none() {
        issues.push("TypeScript not in dependencies".to_string());
        recommendations.push(format!("Run: {}", add_dev_dependency(manager, "typescript")));
    }

    let eslint = ToolConfig {
        config: find_config(&project).map(|loc| loc.file),
        declared: manifest.dependency_spec("eslint").map(str::to_string),
    };
    if eslint.config.is_some() && eslint.declared.is_none() {
        issues.push("ESLint not in dependencies".to_string());
    }

    let diagnosis = Diagnosis {
        project: manifest.display_name().to_string(),
        version: manifest.display_version().to_string(),
        package_manager,
        tools,
        node_required,
        node_satisfied,
        installed_packages,
        expo,
        typescript,
        eslint,
        react_native: manifest.has_dependency("react-native"),
        workspaces: manifest.workspaces.is_some() || project.has_file("pnpm-workspace.yaml"),
    };
    let follow_up = follow_up_commands(&diagnosis);
    debug!("Diagnosis found {} issue(s)", issues.len());

    DiagnoseReport {
        manifest_error: None,
        diagnosis: Some(diagnosis),
        issues,
        recommendations,
        follow_up,
    }
}

fn add_dev_dependency(manager: &str, package: &str) -> String {
    match manager {
        "npm" => format!("npm install -D {}", package),
        _ => format!("{} add -D {}", manager, package),
    }
}

fn follow_up_commands(diagnosis: &Diagnosis) -> Vec<String> {
    let mut commands = Vec::new();
    if diagnosis.package_manager.is_some() {
        commands.push("Check for duplicates: nodedoc lock".to_string());
    }
    commands.push("Check Node compatibility: nodedoc node-version".to_string());
    if diagnosis.workspaces {
        commands.push("Check workspaces: nodedoc monorepo".to_string());
    }
    if diagnosis.typescript.config.is_some() {
        commands.push("Validate tsconfig: nodedoc tsconfig".to_string());
    }
    if diagnosis.eslint.config.is_some() {
        commands.push("Resolve ESLint config: nodedoc eslint".to_string());
    }
    if diagnosis.react_native {
        commands.push("React Native checks: nodedoc rn-doctor".to_string());
    }
    if diagnosis.expo != ExpoCheck::NotExpo {
        commands.push("Expo diagnostics: npx expo-doctor".to_string());
        commands.push("Check dependencies: npx expo install --check".to_string());
    }
    commands
}

fn tool_config_finding(config: &ToolConfig, label: &str, package: &str) -> Finding {
    match (&config.config, &config.declared) {
        (None, _) => Finding::skip(format!("No {} configuration", label)),
        (Some(file), Some(spec)) => {
            Finding::pass(format!("{} found", file)).detail(format!("{}: {}", label, spec))
        }
        (Some(file), None) => Finding::warn(format!("{} found", file))
            .detail(format!("{} config exists but {} is not in dependencies", label, package)),
    }
}

impl IntoReport for DiagnoseReport {
    fn to_report(&self) -> Report {
        let report = Report::new("Node.js Dependency Diagnostic Tool");
        let manifest = Section::new("[1/8] Checking package.json...");

        let Some(d) = &self.diagnosis else {
            let error = self.manifest_error.as_deref().unwrap_or("package.json not found");
            return report.section(manifest.with(Finding::fail(error)));
        };

        let manifest = manifest.with(
            Finding::pass("package.json found")
                .detail(format!("Project: {}", d.project))
                .detail(format!("Version: {}", d.version)),
        );

        let lockfile = Section::new("[2/8] Detecting package manager...").with(match d.package_manager {
            Some(kind) => Finding::pass(format!("Detected: {} ({})", kind, kind.file_name())),
            None => Finding::warn("No lock file found - project may not be installed"),
        });

        let mut node = Section::new("[3/8] Checking Node.js version...");
        match &d.tools.node {
            Some(version) => {
                let status = match d.node_satisfied {
                    Some(false) => Finding::fail(format!("Node.js: v{}", version)),
                    _ => Finding::pass(format!("Node.js: v{}", version)),
                };
                node.push(match &d.node_required {
                    Some(required) => status.detail(format!("Required: {}", required)),
                    None => status,
                });
            }
            None => {
                node.push(Finding::fail("Node.js not found"));
            }
        }

        let mut managers = Section::new("[4/8] Checking package manager versions...");
        let active = d.package_manager.map(|k| k.manager());
        for tool in ["npm", "yarn", "pnpm"] {
            if let Some(version) = d.tools.get(tool) {
                let message = format!("{}: v{}", tool, version);
                managers.push(if active == Some(tool) {
                    Finding::pass(message)
                } else {
                    Finding::info(message)
                });
            }
        }
        if managers.findings.is_empty() {
            managers.push(Finding::warn("No package manager found on PATH"));
        }

        let modules = Section::new("[5/8] Checking node_modules...").with(match d.installed_packages {
            Some(count) => Finding::pass("node_modules exists")
                .detail(format!("~{} packages installed", count)),
            None => Finding::fail("node_modules not found"),
        });

        let expo = Section::new("[6/8] Checking for Expo...").with(match &d.expo {
            ExpoCheck::NotExpo => Finding::skip("Not an Expo project"),
            ExpoCheck::Skipped { sdk } => Finding::info(format!("Expo project detected: {}", sdk))
                .detail("expo-doctor disabled (checks.run_expo_doctor = false)"),
            ExpoCheck::Clean { sdk } => Finding::pass(format!("Expo project detected: {}", sdk))
                .detail("No Expo issues found"),
            ExpoCheck::Issues { sdk, output } => Finding::warn(format!("Expo project detected: {}", sdk))
                .detail("expo-doctor found issues")
                .details(output.lines().filter(|l| !l.trim().is_empty()).take(10).map(|l| l.trim().to_string())),
            ExpoCheck::Unavailable { sdk, error } => Finding::info(format!("Expo project detected: {}", sdk))
                .detail(format!("Could not run expo-doctor: {}", error)),
        });

        let typescript = Section::new("[7/8] Checking TypeScript configuration...")
            .with(tool_config_finding(&d.typescript, "TypeScript", "typescript"));
        let eslint = Section::new("[8/8] Checking ESLint configuration...")
            .with(tool_config_finding(&d.eslint, "ESLint", "eslint"));

        let mut summary = Section::new("SUMMARY");
        if self.issues.is_empty() {
            summary.push(Finding::pass("No issues detected!"));
        } else {
            summary.push(
                Finding::fail(format!("Found {} issue(s)", self.issues.len())).details(
                    self.issues
                        .iter()
                        .enumerate()
                        .map(|(i, issue)| format!("{}. {}", i + 1, issue)),
                ),
            );
        }
        if !self.follow_up.is_empty() {
            summary.push(Finding::info("Additional diagnostic commands").details(
                self.follow_up.iter().map(|c| format!("- {}", c)),
            ));
        }

        report
            .section(manifest)
            .section(lockfile)
            .section(node)
            .section(managers)
            .section(modules)
            .section(expo)
            .section(typescript)
            .section(eslint)
            .section(summary)
            .recommend_all(self.recommendations.iter().cloned())
    }
}
