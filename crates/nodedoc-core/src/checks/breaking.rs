//! Major version bump detection with changelog links

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use super::{registry_request, spec_major, Project};
use crate::registry::{fetch_manifests, PackageRegistry};
use crate::report::{Finding, IntoReport, Report, Section};
use crate::versions::parse_version;

/// Paths appended to a repository URL to find release notes
const CHANGELOG_PATHS: [&str; 3] = ["/blob/main/CHANGELOG.md", "/blob/master/CHANGELOG.md", "/releases"];

/// Changelog links shown per package in the text report
const CHANGELOGS_SHOWN: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MajorBump {
    pub package: String,
    pub current: String,
    pub latest: String,
    pub repository: Option<String>,
    pub changelogs: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakingReport {
    pub analyzed: usize,
    pub bumps: Vec<MajorBump>,
    /// Dependencies whose latest version could not be resolved
    pub unresolved: Vec<String>,
}

/// Turn a `repository.url` into a browsable https URL
///
/// Handles `git+https://...git`, `git://`, `git+ssh://git@host/...`,
/// `git@github.com:user/repo.git` and the `github:user/repo` / `user/repo`
/// shorthands.
pub fn normalize_repository_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    for (prefix, host) in [
        ("github:", "github.com"),
        ("gitlab:", "gitlab.com"),
        ("bitbucket:", "bitbucket.org"),
    ] {
        if let Some(path) = url.strip_prefix(prefix) {
            return Some(format!("https://{}/{}", host, path.trim_end_matches(".git")));
        }
    }

    let mut normalized = url.trim_start_matches("git+").to_string();
    if let Some(rest) = normalized.strip_prefix("git@") {
        // scp-like `git@host:user/repo`
        normalized = format!("https://{}", rest.replacen(':', "/", 1));
    } else if let Some(rest) = normalized.strip_prefix("ssh://git@") {
        normalized = format!("https://{}", rest);
    } else if let Some(rest) = normalized.strip_prefix("git://") {
        normalized = format!("https://{}", rest);
    } else if let Some(rest) = normalized.strip_prefix("http://") {
        normalized = format!("https://{}", rest);
    } else if !normalized.contains("://") && normalized.matches('/').count() == 1 {
        normalized = format!("https://github.com/{}", normalized);
    }

    let normalized = normalized.trim_end_matches('/');
    let normalized = normalized.strip_suffix(".git").unwrap_or(normalized);
    Some(normalized.to_string())
}

pub fn changelog_urls(repository: &str) -> Vec<String> {
    CHANGELOG_PATHS
        .iter()
        .map(|path| format!("{}{}", repository, path))
        .collect()
}

/// Whether `latest` has a higher major than the lowest version `current` admits
pub fn is_major_bump(current: &str, latest: &str) -> bool {
    match (spec_major(current), parse_version(latest)) {
        (Some(current), Some(latest)) => latest.major > current,
        _ => false,
    }
}

pub async fn check_breaking_changes(
    project: &Project,
    registry: Arc<dyn PackageRegistry>,
    concurrency: usize,
) -> Result<BreakingReport> {
    let dependencies = project.manifest.all_dependencies();
    let requests: Vec<(String, String)> = dependencies
        .iter()
        .filter_map(|(name, spec)| registry_request(name, spec))
        .map(|(package, _)| (package, "latest".to_string()))
        .collect();
    info!("Checking {} dependencies for major bumps", requests.len());

    let declared: Vec<(&String, &String)> = dependencies
        .iter()
        .filter(|(name, spec)| registry_request(name, spec).is_some())
        .collect();
    let latest = fetch_manifests(registry, requests, concurrency).await;

    let mut bumps = Vec::new();
    let mut unresolved = Vec::new();
    for ((name, spec), ((package, _), manifest)) in declared.into_iter().zip(latest) {
        let Some(manifest) = manifest else {
            unresolved.push(name.clone());
            continue;
        };
        // Aliases carry their range after `npm:pkg@`
        let current = match spec.strip_prefix("npm:") {
            Some(alias) => crate::versions::split_name_and_range(alias)
                .1
                .unwrap_or("*")
                .to_string(),
            None => spec.clone(),
        };
        if !is_major_bump(&current, &manifest.version) {
            continue;
        }

        let repository = manifest
            .repository
            .as_ref()
            .and_then(|r| r.url())
            .and_then(normalize_repository_url);
        bumps.push(MajorBump {
            package: if package == *name {
                package
            } else {
                format!("{} ({})", name, package)
            },
            current: spec.clone(),
            latest: manifest.version,
            changelogs: repository.as_deref().map(changelog_urls).unwrap_or_default(),
            repository,
        });
    }

    Ok(BreakingReport {
        analyzed: dependencies.len(),
        bumps,
        unresolved,
    })
}

impl IntoReport for BreakingReport {
    fn to_report(&self) -> Report {
        let report = Report::new("Breaking Change Checker").line(format!(
            "Analyzing {} dependencies for potential breaking changes...",
            self.analyzed
        ));

        let mut unresolved = Section::new("Unresolved");
        if !self.unresolved.is_empty() {
            unresolved.push(
                Finding::skip(format!(
                    "Could not look up {} package(s) in the registry",
                    self.unresolved.len()
                ))
                .detail(self.unresolved.join(", ")),
            );
        }

        if self.bumps.is_empty() {
            let mut report = report.section(
                Section::new("Result").with(
                    Finding::pass("No major version bumps detected for current dependencies")
                        .detail("All updates would be minor or patch versions"),
                ),
            );
            if !unresolved.findings.is_empty() {
                report = report.section(unresolved);
            }
            return report;
        }

        let mut section = Section::new(format!(
            "FOUND {} PACKAGE(S) WITH MAJOR VERSION CHANGES",
            self.bumps.len()
        ));
        for bump in &self.bumps {
            let mut finding = Finding::warn(format!(
                "{}: {} → {} (MAJOR)",
                bump.package, bump.current, bump.latest
            ))
            .detail("MAJOR version change - may contain breaking changes");
            if let Some(repository) = &bump.repository {
                finding = finding.detail(format!("Repository: {}", repository));
            }
            if !bump.changelogs.is_empty() {
                finding = finding.detail("Check changelog at:").details(
                    bump.changelogs
                        .iter()
                        .take(CHANGELOGS_SHOWN)
                        .map(|url| format!("  • {}", url)),
                );
            }
            section.push(finding);
        }

        let mut report = report.section(section);
        if !unresolved.findings.is_empty() {
            report = report.section(unresolved);
        }
        report.recommend_all([
            "Review changelogs and migration guides for breaking changes",
            "Update one package at a time and test thoroughly after each upgrade",
            "Upgrade a specific package: npm install <package>@latest",
            "See all outdated packages: npm outdated",
        ])
    }
}
