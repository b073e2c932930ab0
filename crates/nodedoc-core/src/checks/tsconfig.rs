//! tsconfig.json validation
//!
//! Resolves the `extends` chain the way `tsc` does (base first, then each
//! child overriding `compilerOptions` key by key) before checking options,
//! path aliases, include/exclude and type declarations.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::Project;
use crate::jsonc;
use crate::paths::display_relative;
use crate::report::{Finding, IntoReport, Report, Section, Status};

pub const DEFAULT_TSCONFIG: &str = "tsconfig.json";

/// Runtime packages and the `@types` package they need
const TYPES_FOR: [(&str, &str); 6] = [
    ("react", "@types/react"),
    ("react-dom", "@types/react-dom"),
    ("node", "@types/node"),
    ("jest", "@types/jest"),
    ("express", "@types/express"),
    ("lodash", "@types/lodash"),
];

/// A tsconfig with its `extends` chain applied
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedTsconfig {
    /// Config files, base first
    pub chain: Vec<PathBuf>,
    pub compiler_options: Map<String, Value>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// `extends` entries that could not be found
    pub unresolved_extends: Vec<String>,
    /// Configs that extend themselves through the chain
    pub circular_extends: Vec<PathBuf>,
    /// Directory `paths` entries are resolved from
    pub paths_base: Option<PathBuf>,
}

impl ResolvedTsconfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut resolved = Self::default();
        let mut base_url_dir: Option<PathBuf> = None;
        let mut paths_dir: Option<PathBuf> = None;
        let mut stack = Vec::new();

        resolved.apply(path, &mut stack, &mut base_url_dir, &mut paths_dir)?;
        resolved.paths_base = base_url_dir.or(paths_dir);
        Ok(resolved)
    }

    fn apply(
        &mut self,
        path: &Path,
        stack: &mut Vec<PathBuf>,
        base_url_dir: &mut Option<PathBuf>,
        paths_dir: &mut Option<PathBuf>,
    ) -> Result<()> {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if stack.contains(&canonical) {
            warn!("Circular tsconfig extends through {:?}", path);
            self.circular_extends.push(path.to_path_buf());
            return Ok(());
        }

        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let raw: Value =
            jsonc::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;
        let dir = path.parent().unwrap_or(Path::new("."));

        stack.push(canonical);
        for spec in string_list(raw.get("extends")) {
            match resolve_extends(dir, &spec) {
                Some(base) => {
                    debug!("{:?} extends {:?}", path, base);
                    self.apply(&base, stack, base_url_dir, paths_dir)?;
                }
                None => self.unresolved_extends.push(spec),
            }
        }
        stack.pop();

        if let Some(Value::Object(options)) = raw.get("compilerOptions") {
            for (key, value) in options {
                self.compiler_options.insert(key.clone(), value.clone());
            }
            if let Some(base_url) = options.get("baseUrl").and_then(Value::as_str) {
                *base_url_dir = Some(dir.join(base_url));
            }
            if options.contains_key("paths") {
                *paths_dir = Some(dir.to_path_buf());
            }
        }
        if raw.get("include").is_some() {
            self.include = Some(string_list(raw.get("include")));
        }
        if raw.get("exclude").is_some() {
            self.exclude = Some(string_list(raw.get("exclude")));
        }
        self.chain.push(path.to_path_buf());
        Ok(())
    }

    fn option(&self, key: &str) -> Option<&Value> {
        self.compiler_options.get(key)
    }

    fn option_str(&self, key: &str) -> Option<&str> {
        self.option(key).and_then(Value::as_str)
    }
}

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

/// Locate the file an `extends` value refers to
pub fn resolve_extends(dir: &Path, spec: &str) -> Option<PathBuf> {
    let is_relative = spec.starts_with('.') || Path::new(spec).is_absolute();
    if is_relative {
        let path = dir.join(spec);
        return candidates(&path).into_iter().find(|p| p.is_file());
    }

    // Package specifier: walk up looking for node_modules/<spec>
    dir.ancestors().find_map(|ancestor| {
        let path = ancestor.join("node_modules").join(spec);
        candidates(&path).into_iter().find(|p| p.is_file())
    })
}

fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut with_json = path.as_os_str().to_owned();
    with_json.push(".json");
    vec![
        path.to_path_buf(),
        PathBuf::from(with_json),
        path.join("tsconfig.json"),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TsCategory {
    CompilerOptions,
    Paths,
    IncludeExclude,
    Types,
}

impl TsCategory {
    const ALL: [TsCategory; 4] = [
        TsCategory::CompilerOptions,
        TsCategory::Paths,
        TsCategory::IncludeExclude,
        TsCategory::Types,
    ];

    fn title(&self) -> &'static str {
        match self {
            TsCategory::CompilerOptions => "[1/4] Checking compiler options...",
            TsCategory::Paths => "[2/4] Checking path mappings...",
            TsCategory::IncludeExclude => "[3/4] Checking include/exclude patterns...",
            TsCategory::Types => "[4/4] Checking type declarations...",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TsFinding {
    pub category: TsCategory,
    pub status: Status,
    pub message: String,
}

impl TsFinding {
    fn issue(category: TsCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            status: Status::Fail,
            message: message.into(),
        }
    }

    fn warning(category: TsCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            status: Status::Warn,
            message: message.into(),
        }
    }
}

pub fn check_compiler_options(config: &ResolvedTsconfig, project: &Project) -> Vec<TsFinding> {
    use TsCategory::CompilerOptions as C;
    let mut findings = Vec::new();

    let target = config.option_str("target").unwrap_or("ES5");
    if matches!(target.to_ascii_uppercase().as_str(), "ES3" | "ES5") {
        findings.push(TsFinding::warning(
            C,
            format!("Target '{}' is quite old - consider ES2015 or newer", target),
        ));
    }
    if config.option("module").is_none() {
        findings.push(TsFinding::issue(
            C,
            "No 'module' specified - the default depends on 'target' (CommonJS for old targets)",
        ));
    }
    if config.option("lib").is_none() {
        findings.push(TsFinding::warning(
            C,
            "No 'lib' specified - will use default for target",
        ));
    }
    if config.option("paths").is_some() && config.option("baseUrl").is_none() {
        findings.push(TsFinding::warning(
            C,
            "'paths' without 'baseUrl' resolves relative to the tsconfig (TypeScript 4.1+ only)",
        ));
    }
    if config.option("strict").and_then(Value::as_bool) != Some(true) {
        findings.push(TsFinding::warning(
            C,
            "'strict' mode not enabled - consider enabling for better type safety",
        ));
    }

    if let Some(jsx) = config.option_str("jsx") {
        let types_react = config
            .option("types")
            .and_then(Value::as_array)
            .is_some_and(|types| types.iter().any(|t| t.as_str() == Some("react")));
        if jsx != "preserve" && !types_react && !project.manifest.has_dependency("@types/react") {
            findings.push(TsFinding::warning(
                C,
                format!("JSX is '{}' but @types/react is not installed", jsx),
            ));
        }
    }

    for spec in &config.unresolved_extends {
        findings.push(TsFinding::issue(
            C,
            format!("Could not resolve extends '{}'", spec),
        ));
    }
    for path in &config.circular_extends {
        findings.push(TsFinding::issue(
            C,
            format!("Circular extends through {}", path.display()),
        ));
    }
    findings
}

pub fn check_paths(config: &ResolvedTsconfig, project: &Project) -> Vec<TsFinding> {
    let Some(Value::Object(paths)) = config.option("paths") else {
        return Vec::new();
    };
    let base = config.paths_base.clone().unwrap_or_else(|| project.dir.clone());

    let mut findings = Vec::new();
    for (alias, targets) in paths {
        for target in string_list(Some(targets)) {
            let prefix = target.split('*').next().unwrap_or_default();
            let full = base.join(prefix);
            if !full.exists() {
                findings.push(TsFinding::issue(
                    TsCategory::Paths,
                    format!(
                        "Path alias '{}' points to non-existent '{}'",
                        alias,
                        display_relative(&full, &project.dir)
                    ),
                ));
            }
        }
    }
    findings
}

pub fn check_include_exclude(config: &ResolvedTsconfig) -> Vec<TsFinding> {
    use TsCategory::IncludeExclude as IE;
    let mut findings = Vec::new();

    if let Some(exclude) = &config.exclude {
        if !exclude.iter().any(|e| e.trim_start_matches("./").starts_with("node_modules")) {
            findings.push(TsFinding::warning(
                IE,
                "'exclude' is set but omits 'node_modules' - may slow compilation",
            ));
        }
    }
    if config.include.as_ref().is_some_and(|include| include.is_empty()) {
        findings.push(TsFinding::warning(
            IE,
            "'include' is empty - no files will be compiled from it",
        ));
    }
    findings
}

pub fn check_type_declarations(project: &Project) -> Vec<TsFinding> {
    TYPES_FOR
        .iter()
        .filter(|(package, types)| {
            project.manifest.has_dependency(package) && !project.manifest.has_dependency(types)
        })
        .map(|(package, types)| {
            TsFinding::warning(TsCategory::Types, format!("Install {} for {}", types, package))
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct TsconfigReport {
    pub file: String,
    pub found: bool,
    /// Resolved chain, base first, relative to the project
    pub chain: Vec<String>,
    pub findings: Vec<TsFinding>,
}

pub fn validate_tsconfig(project: &Project, file: Option<&str>) -> Result<TsconfigReport> {
    let file = file.unwrap_or(DEFAULT_TSCONFIG);
    let path = project.path(file);
    if !path.is_file() {
        return Ok(TsconfigReport {
            file: file.to_string(),
            found: false,
            chain: Vec::new(),
            findings: Vec::new(),
        });
    }

    let config = ResolvedTsconfig::load(&path)?;
    let mut findings = check_compiler_options(&config, project);
    findings.extend(check_paths(&config, project));
    findings.extend(check_include_exclude(&config));
    findings.extend(check_type_declarations(project));

    Ok(TsconfigReport {
        file: file.to_string(),
        found: true,
        chain: config
            .chain
            .iter()
            .map(|p| display_relative(p, &project.dir))
            .collect(),
        findings,
    })
}

impl IntoReport for TsconfigReport {
    fn to_report(&self) -> Report {
        let report = Report::new("TypeScript Config Validator");
        if !self.found {
            return report.section(
                Section::new("Config").with(Finding::fail(format!("{} not found", self.file))),
            );
        }

        let mut found = Finding::pass(format!("{} found", self.file));
        if self.chain.len() > 1 {
            found = found.detail(format!("extends chain: {}", self.chain.join(" <- ")));
        }
        let mut report = report.section(Section::new("Config").with(found));

        for category in TsCategory::ALL {
            let mut section = Section::new(category.title());
            let findings: Vec<&TsFinding> = self
                .findings
                .iter()
                .filter(|f| f.category == category)
                .collect();
            if findings.is_empty() {
                section.push(Finding::pass(match category {
                    TsCategory::Types => "All common types installed",
                    _ => "No issues",
                }));
            }
            for finding in findings {
                section.push(Finding::new(finding.status, finding.message.clone()));
            }
            report = report.section(section);
        }

        report.recommend_all([
            "Enable 'strict' mode for better type safety",
            "Use 'skipLibCheck' to speed up compilation",
            "Configure 'paths' for cleaner imports",
            "Exclude unnecessary directories (node_modules, dist, build)",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::write;
    use tempfile::tempdir;

    fn messages(report: &TsconfigReport) -> Vec<&str> {
        report.findings.iter().map(|f| f.message.as_str()).collect()
    }

    #[test]
    fn test_extends_chain_merges_compiler_options() {
        let temp = tempdir().unwrap();
        write(temp.path(), "package.json", "{}");
        write(
            temp.path(),
            "node_modules/@tsconfig/node20/tsconfig.json",
            r#"{"compilerOptions": {"target": "es2022", "module": "node16", "strict": true, "lib": ["es2023"]}}"#,
        );
        write(
            temp.path(),
            "tsconfig.base.json",
            r#"{
                // shared
                "extends": "@tsconfig/node20/tsconfig.json",
                "compilerOptions": {"strict": false, "baseUrl": "src",},
            }"#,
        );
        write(
            temp.path(),
            "tsconfig.json",
            r#"{"extends": "./tsconfig.base", "compilerOptions": {"strict": true}}"#,
        );

        let config = ResolvedTsconfig::load(&temp.path().join("tsconfig.json")).unwrap();
        assert_eq!(config.chain.len(), 3);
        assert_eq!(config.option_str("target"), Some("es2022"));
        assert_eq!(config.option("strict"), Some(&Value::Bool(true)));
        assert_eq!(config.paths_base, Some(temp.path().join("src")));
        assert!(config.unresolved_extends.is_empty());
    }

    #[test]
    fn test_circular_extends_terminates() {
        let temp = tempdir().unwrap();
        write(temp.path(), "a.json", r#"{"extends": "./b.json"}"#);
        write(temp.path(), "b.json", r#"{"extends": "./a.json"}"#);
        let config = ResolvedTsconfig::load(&temp.path().join("a.json")).unwrap();
        assert_eq!(config.circular_extends.len(), 1);
    }

    #[test]
    fn test_validate_reports_problems() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{"dependencies":{"react":"^18.2.0","express":"^4.19.0"},"devDependencies":{"@types/express":"^4.17.21"}}"#,
        );
        write(temp.path(), "src/components/.keep", "");
        write(
            temp.path(),
            "tsconfig.json",
            r#"{
                "compilerOptions": {
                    "target": "ES5",
                    "jsx": "react-jsx",
                    "paths": {"@/*": ["src/*"], "@ui/*": ["src/ui/*"]},
                    "baseUrl": "."
                },
                "extends": ["./missing.json"],
                "exclude": ["dist"]
            }"#,
        );

        let project = Project::load(temp.path()).unwrap();
        let report = validate_tsconfig(&project, None).unwrap();
        let messages = messages(&report);

        assert!(messages.iter().any(|m| m.starts_with("Target 'ES5' is quite old")));
        assert!(messages.iter().any(|m| m.starts_with("No 'module' specified")));
        assert!(messages.iter().any(|m| m.starts_with("'strict' mode not enabled")));
        assert!(messages.contains(&"JSX is 'react-jsx' but @types/react is not installed"));
        assert!(messages.contains(&"Could not resolve extends './missing.json'"));
        assert!(messages.contains(&"Path alias '@ui/*' points to non-existent 'src/ui'"));
        assert!(!messages.iter().any(|m| m.contains("'@/*'")));
        assert!(messages.iter().any(|m| m.contains("omits 'node_modules'")));
        assert!(messages.contains(&"Install @types/react for react"));
        assert!(!messages.contains(&"Install @types/express for express"));

        assert!(report.to_report().has_failures());
    }

    #[test]
    fn test_missing_tsconfig() {
        let temp = tempdir().unwrap();
        write(temp.path(), "package.json", "{}");
        let project = Project::load(temp.path()).unwrap();
        let report = validate_tsconfig(&project, Some("tsconfig.app.json")).unwrap();
        assert!(!report.found);
        assert!(report
            .to_report()
            .to_string()
            .contains("tsconfig.app.json not found"));
    }
}
