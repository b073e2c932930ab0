//! `npm audit --json` analysis and fix prioritisation

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DoctorError;
use crate::process::CommandRunner;
use crate::report::{Finding, IntoReport, Report, Section, Status};

/// Vulnerabilities listed per severity before truncating
const PER_SEVERITY_LIMIT: usize = 5;
/// Entries of the `via` chain listed per vulnerability
const VIA_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Moderate,
    Low,
    Info,
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Moderate,
        Severity::Low,
        Severity::Info,
    ];

    pub fn impact(&self) -> &'static str {
        match self {
            Severity::Critical => {
                "IMMEDIATE ACTION REQUIRED - Known exploits, remote code execution"
            }
            Severity::High => "HIGH PRIORITY - Serious security issues, potential data exposure",
            Severity::Moderate => "MEDIUM PRIORITY - Security issues with limited scope",
            Severity::Low => "LOW PRIORITY - Minor issues, limited attack vectors",
            Severity::Info => "INFORMATIONAL - No immediate action required",
            Severity::Unknown => "Unknown severity",
        }
    }

    fn status(&self) -> Status {
        match self {
            Severity::Critical | Severity::High => Status::Fail,
            Severity::Moderate => Status::Warn,
            _ => Status::Info,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Moderate => "moderate",
            Severity::Low => "low",
            Severity::Info => "info",
            Severity::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// One link of a vulnerability chain: an advisory or another vulnerable package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Via {
    Package(String),
    Advisory {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        severity: Option<Severity>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixAvailable {
    Flag(bool),
    Update {
        name: String,
        version: String,
        #[serde(default, rename = "isSemVerMajor")]
        is_semver_major: bool,
    },
}

impl Default for FixAvailable {
    fn default() -> Self {
        FixAvailable::Flag(false)
    }
}

impl FixAvailable {
    pub fn is_available(&self) -> bool {
        !matches!(self, FixAvailable::Flag(false))
    }

    pub fn is_breaking(&self) -> bool {
        matches!(
            self,
            FixAvailable::Update {
                is_semver_major: true,
                ..
            }
        )
    }

    fn describe(&self) -> String {
        match self {
            FixAvailable::Flag(false) => {
                "Not available - may need to update or remove package".to_string()
            }
            FixAvailable::Flag(true) => "Available".to_string(),
            FixAvailable::Update {
                name,
                version,
                is_semver_major,
            } => format!(
                "Update to {}@{}{}",
                name,
                version,
                if *is_semver_major {
                    " (BREAKING CHANGE)"
                } else {
                    ""
                }
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "unknown_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub via: Vec<Via>,
    #[serde(default)]
    pub effects: Vec<String>,
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub fix_available: FixAvailable,
}

fn unknown_severity() -> Severity {
    Severity::Unknown
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityCounts {
    pub info: u64,
    pub low: u64,
    pub moderate: u64,
    pub high: u64,
    pub critical: u64,
    pub total: u64,
}

impl SeverityCounts {
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Moderate => self.moderate,
            Severity::Low => self.low,
            Severity::Info => self.info,
            Severity::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DependencyCounts {
    pub prod: Option<u64>,
    pub dev: Option<u64>,
    pub optional: Option<u64>,
    pub peer: Option<u64>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditMetadata {
    pub vulnerabilities: SeverityCounts,
    pub dependencies: DependencyCounts,
}

/// `npm audit --json` output (npm 7+ format)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditOutput {
    pub vulnerabilities: BTreeMap<String, Vulnerability>,
    pub metadata: AuditMetadata,
}

impl AuditOutput {
    pub fn parse(content: &str) -> Result<Self> {
        Self::parse_from(content, "npm audit --json")
    }

    /// Parse output of `command`. An `{"error": {...}}` payload (npm's own
    /// failures, e.g. ENOLOCK) or JSON with neither top-level key is an error.
    fn parse_from(content: &str, command: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(content).context("Failed to parse npm audit JSON")?;

        if let Some(error) = value.get("error") {
            let field = |key: &str| error.get(key).and_then(|v| v.as_str()).unwrap_or_default();
            let message = match (field("code"), field("summary")) {
                ("", "") => error.to_string(),
                (code, "") => code.to_string(),
                ("", summary) => summary.to_string(),
                (code, summary) => format!("{}: {}", code, summary),
            };
            return Err(DoctorError::CommandFailed {
                command: command.to_string(),
                message,
            }
            .into());
        }
        if value.get("vulnerabilities").is_none() && value.get("metadata").is_none() {
            return Err(DoctorError::CommandFailed {
                command: command.to_string(),
                message: "output has neither `vulnerabilities` nor `metadata`".to_string(),
            }
            .into());
        }

        serde_json::from_value(value).context("Failed to parse npm audit JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Invalid audit data in {:?}", path))
    }

    /// Run `npm audit --json` in `dir`. npm exits non-zero when it finds
    /// vulnerabilities, so only missing output is treated as failure.
    pub async fn run(runner: &dyn CommandRunner, npm: &str, dir: &Path) -> Result<Self> {
        info!("Running {} audit --json in {:?}", npm, dir);
        let output = runner.run(npm, &["audit", "--json"], dir).await?;
        if output.stdout.trim().is_empty() {
            return Err(DoctorError::CommandFailed {
                command: format!("{} audit --json", npm),
                message: output.stderr,
            }
            .into());
        }
        Self::parse_from(&output.stdout, &format!("{} audit --json", npm))
    }

    /// Total from the metadata, falling back to the vulnerability map
    pub fn total(&self) -> u64 {
        match self.metadata.vulnerabilities.total {
            0 => self.vulnerabilities.len() as u64,
            total => total,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Low,
    Medium,
    High,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Risk::Low => "LOW",
            Risk::Medium => "MEDIUM",
            Risk::High => "HIGH",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixCommand {
    pub command: String,
    pub description: String,
    pub risk: Risk,
}

impl FixCommand {
    fn new(command: &str, description: &str, risk: Risk) -> Self {
        Self {
            command: command.to_string(),
            description: description.to_string(),
            risk,
        }
    }
}

/// Fix commands ordered from safest to riskiest
pub fn fix_commands(audit: &AuditOutput) -> Vec<FixCommand> {
    if audit.total() == 0 {
        return Vec::new();
    }
    vec![
        FixCommand::new(
            "npm audit fix",
            "Attempt automatic fix for non-breaking changes",
            Risk::Low,
        ),
        FixCommand::new(
            "npm update",
            "Update all packages within their semver ranges",
            Risk::Medium,
        ),
        FixCommand::new(
            "npm audit fix --force",
            "Force fix including breaking changes (may break app)",
            Risk::High,
        ),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct VulnerabilityEntry {
    pub package: String,
    #[serde(flatten)]
    pub vulnerability: Vulnerability,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeverityGroup {
    pub severity: Severity,
    pub impact: String,
    pub vulnerabilities: Vec<VulnerabilityEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub source: String,
    pub total: u64,
    pub counts: SeverityCounts,
    pub groups: Vec<SeverityGroup>,
    pub fix_commands: Vec<FixCommand>,
    /// Critical + high
    pub urgent: u64,
    pub breaking_fixes: usize,
    pub dependencies: DependencyCounts,
}

/// Group vulnerabilities by severity, most severe first
pub fn analyze_audit(audit: &AuditOutput, source: impl Into<String>) -> AuditReport {
    let mut by_severity: BTreeMap<Severity, Vec<VulnerabilityEntry>> = BTreeMap::new();
    for (package, vulnerability) in &audit.vulnerabilities {
        by_severity
            .entry(vulnerability.severity)
            .or_default()
            .push(VulnerabilityEntry {
                package: package.clone(),
                vulnerability: vulnerability.clone(),
            });
    }

    let groups = by_severity
        .into_iter()
        .map(|(severity, vulnerabilities)| SeverityGroup {
            severity,
            impact: severity.impact().to_string(),
            vulnerabilities,
        })
        .collect();

    let counts = audit.metadata.vulnerabilities.clone();
    let breaking_fixes = audit
        .vulnerabilities
        .values()
        .filter(|v| v.fix_available.is_breaking())
        .count();
    debug!(
        "Audit: {} vulnerabilities, {} with breaking fixes",
        audit.total(),
        breaking_fixes
    );

    AuditReport {
        source: source.into(),
        total: audit.total(),
        urgent: counts.critical + counts.high,
        counts,
        groups,
        fix_commands: fix_commands(audit),
        breaking_fixes,
        dependencies: audit.metadata.dependencies.clone(),
    }
}

fn via_lines(via: &[Via]) -> Vec<String> {
    let mut lines = Vec::new();
    for link in via.iter().take(VIA_LIMIT) {
        match link {
            Via::Package(name) => lines.push(format!("  - {}", name)),
            Via::Advisory { title, url, .. } => {
                lines.push(format!("  - {}", title.as_deref().unwrap_or("Unknown")));
                if let Some(url) = url.as_deref().filter(|u| !u.is_empty()) {
                    lines.push(format!("    {}", url));
                }
            }
        }
    }
    lines
}

fn count_or_unknown(count: Option<u64>) -> String {
    count.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

impl IntoReport for AuditReport {
    fn to_report(&self) -> Report {
        let report = Report::new("NPM Security Audit Analyzer").line(self.source.clone());

        if self.total == 0 {
            return report.section(
                Section::new("Vulnerabilities").with(Finding::pass("No vulnerabilities found!")),
            );
        }

        let mut counts = Section::new(format!("Found {} vulnerabilities", self.total));
        for severity in Severity::ALL {
            let count = self.counts.get(severity);
            if count > 0 {
                counts.push(Finding::new(
                    severity.status(),
                    format!("{}: {}", severity.to_string().to_uppercase(), count),
                ));
            }
        }

        let mut report = report.section(counts);
        for group in &self.groups {
            let mut section = Section::new(format!(
                "{} ({} issues)",
                group.severity.to_string().to_uppercase(),
                group.vulnerabilities.len()
            ))
            .with(Finding::info(format!("Impact: {}", group.impact)));

            section.push_limited(
                group.vulnerabilities.iter().map(|entry| {
                    let vulnerability = &entry.vulnerability;
                    let mut finding =
                        Finding::new(group.severity.status(), format!("Package: {}", entry.package))
                            .detail(format!(
                                "Range: {}",
                                vulnerability.range.as_deref().unwrap_or("unknown")
                            ));
                    if !vulnerability.via.is_empty() {
                        finding = finding.detail("Via:").details(via_lines(&vulnerability.via));
                    }
                    finding.detail(format!("Fix: {}", vulnerability.fix_available.describe()))
                }),
                PER_SEVERITY_LIMIT,
                &format!("{} vulnerabilities", group.severity),
            );
            report = report.section(section);
        }

        report = report.section(
            Section::new("Dependencies")
                .with(Finding::info(format!(
                    "Total dependencies scanned: {}",
                    count_or_unknown(self.dependencies.total)
                )))
                .with(Finding::info(format!(
                    "Production dependencies: {}",
                    count_or_unknown(self.dependencies.prod)
                )))
                .with(Finding::info(format!(
                    "Development dependencies: {}",
                    count_or_unknown(self.dependencies.dev)
                ))),
        );

        if self.urgent > 0 {
            report = report.recommend(format!(
                "ADDRESS CRITICAL/HIGH SEVERITY ({} issues) - these require immediate attention",
                self.urgent
            ));
        }
        for command in &self.fix_commands {
            report = report.recommend(format!(
                "{} - {} (risk: {})",
                command.command, command.description, command.risk
            ));
        }
        if self.breaking_fixes > 0 {
            report = report.recommend(format!(
                "{} fix(es) require a major version bump; review changelogs before forcing",
                self.breaking_fixes
            ));
        }
        report.recommend_all([
            "Review package dependencies - can any vulnerable packages be removed?",
            "Check for alternative packages without vulnerabilities",
            "For unfixable issues, evaluate the actual risk to your application",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, FakeRunner};

    const SAMPLE: &str = r#"{
      "auditReportVersion": 2,
      "vulnerabilities": {
        "minimist": {
          "name": "minimist",
          "severity": "critical",
          "via": [{"title": "Prototype Pollution", "url": "https://github.com/advisories/GHSA-xvch-5gv4-984h", "severity": "critical"}],
          "effects": ["mkdirp"],
          "range": "<=0.2.3",
          "fixAvailable": true
        },
        "mkdirp": {
          "name": "mkdirp",
          "severity": "high",
          "via": ["minimist"],
          "range": "0.4.1 - 0.5.1",
          "fixAvailable": {"name": "mkdirp", "version": "1.0.4", "isSemVerMajor": true}
        },
        "debug": {
          "severity": "low",
          "via": [],
          "range": "<2.6.9",
          "fixAvailable": false
        }
      },
      "metadata": {
        "vulnerabilities": {"info": 0, "low": 1, "moderate": 0, "high": 1, "critical": 1, "total": 3},
        "dependencies": {"prod": 120, "dev": 300, "optional": 2, "peer": 0, "total": 421}
      }
    }"#;

    #[test]
    fn test_parse_audit_output() {
        let audit = AuditOutput::parse(SAMPLE).unwrap();
        assert_eq!(audit.total(), 3);

        let mkdirp = &audit.vulnerabilities["mkdirp"];
        assert_eq!(mkdirp.via, [Via::Package("minimist".into())]);
        assert!(mkdirp.fix_available.is_breaking());
        assert!(!audit.vulnerabilities["debug"].fix_available.is_available());
        assert_eq!(audit.metadata.dependencies.total, Some(421));
    }

    #[test]
    fn test_unknown_severity_is_tolerated() {
        let audit =
            AuditOutput::parse(r#"{"vulnerabilities":{"x":{"severity":"urgent"}}}"#).unwrap();
        assert_eq!(audit.vulnerabilities["x"].severity, Severity::Unknown);
        assert_eq!(audit.total(), 1);
    }

    #[test]
    fn test_groups_ordered_by_severity() {
        let audit = AuditOutput::parse(SAMPLE).unwrap();
        let result = analyze_audit(&audit, "Loaded audit data from: audit.json");
        let order: Vec<Severity> = result.groups.iter().map(|g| g.severity).collect();
        assert_eq!(order, [Severity::Critical, Severity::High, Severity::Low]);
        assert_eq!(result.urgent, 2);
        assert_eq!(result.breaking_fixes, 1);

        let risks: Vec<Risk> = result.fix_commands.iter().map(|c| c.risk).collect();
        assert_eq!(risks, [Risk::Low, Risk::Medium, Risk::High]);
    }

    #[test]
    fn test_report_text() {
        let audit = AuditOutput::parse(SAMPLE).unwrap();
        let report = analyze_audit(&audit, "audit.json").to_report();
        let text = report.to_string();
        assert!(report.has_failures());
        assert!(text.contains("CRITICAL: 1"));
        assert!(text.contains("Impact: IMMEDIATE ACTION REQUIRED"));
        assert!(text.contains("  - Prototype Pollution"));
        assert!(text.contains("Fix: Update to mkdirp@1.0.4 (BREAKING CHANGE)"));
        assert!(text.contains("Fix: Not available"));
        assert!(text.contains("Total dependencies scanned: 421"));
        assert!(text.contains("ADDRESS CRITICAL/HIGH SEVERITY (2 issues)"));
    }

    #[test]
    fn test_clean_audit() {
        let audit = AuditOutput::parse(r#"{"vulnerabilities":{},"metadata":{}}"#).unwrap();
        let result = analyze_audit(&audit, "npm audit");
        assert!(result.fix_commands.is_empty());
        assert!(result
            .to_report()
            .to_string()
            .contains("No vulnerabilities found!"));
    }

    #[tokio::test]
    async fn test_run_accepts_nonzero_exit() {
        let runner = FakeRunner::new().respond(
            "npm audit --json",
            CommandOutput {
                code: Some(1),
                stdout: SAMPLE.to_string(),
                stderr: String::new(),
            },
        );
        let audit = AuditOutput::run(&runner, "npm", Path::new(".")).await.unwrap();
        assert_eq!(audit.total(), 3);

        let empty = FakeRunner::new().respond("npm audit --json", CommandOutput::failed(1, "ENOLOCK"));
        let err = AuditOutput::run(&empty, "npm", Path::new(".")).await.unwrap_err();
        assert!(err.to_string().contains("npm audit --json"));
    }

    const ENOLOCK: &str = r#"{
      "error": {
        "code": "ENOLOCK",
        "summary": "This command requires an existing lockfile.",
        "detail": "Try creating one first with: npm i --package-lock-only"
      }
    }"#;

    #[tokio::test]
    async fn test_run_rejects_npm_error_payload() {
        let runner = FakeRunner::new().respond(
            "npm audit --json",
            CommandOutput {
                code: Some(1),
                stdout: ENOLOCK.to_string(),
                stderr: String::new(),
            },
        );
        let err = AuditOutput::run(&runner, "npm", Path::new(".")).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("npm audit --json"));
        assert!(message.contains("ENOLOCK: This command requires an existing lockfile."));
        assert!(matches!(
            err.downcast_ref::<DoctorError>(),
            Some(DoctorError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_load_rejects_error_and_unrelated_json() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("audit.json");

        fs::write(&path, ENOLOCK).unwrap();
        let err = AuditOutput::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("ENOLOCK"));

        fs::write(&path, r#"{"name": "app"}"#).unwrap();
        let err = AuditOutput::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("neither `vulnerabilities` nor `metadata`"));
    }
}
