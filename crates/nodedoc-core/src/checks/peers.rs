//! Peer dependency conflict resolution
//!
//! Collects the `peerDependencies` each direct dependency publishes and,
//! for every peer requested with more than one range, looks for a version
//! that satisfies all of them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{registry_request, Project};
use crate::registry::{fetch_manifests, PackageRegistry};
use crate::report::{Finding, IntoReport, Report, Section};
use crate::versions::{parse_version, Range};

/// One package's peer requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRequirement {
    pub required_by: String,
    pub range: String,
    /// Whether the project's declared version satisfies `range`
    pub satisfied: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerConflict {
    pub peer: String,
    pub requirements: Vec<PeerRequirement>,
    /// Spec from the project's package.json
    pub declared: Option<String>,
    /// Highest published version satisfying every requirement
    pub compatible: Option<String>,
    pub latest: Option<String>,
    /// Some ranges pin an exact version while others float
    pub mixed_exact: bool,
}

impl PeerConflict {
    /// Version to force through overrides/resolutions
    pub fn suggested_version(&self) -> &str {
        self.compatible
            .as_deref()
            .or(self.latest.as_deref())
            .unwrap_or("VERSION")
    }

    pub fn overrides_snippet(&self) -> String {
        format!(
            "\"overrides\": {{ \"{}\": \"{}\" }}",
            self.peer,
            self.suggested_version()
        )
    }

    pub fn resolutions_snippet(&self) -> String {
        format!(
            "\"resolutions\": {{ \"{}\": \"{}\" }}",
            self.peer,
            self.suggested_version()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerReport {
    pub project: String,
    pub analyzed_dependencies: usize,
    /// Distinct peers requested by any dependency
    pub peer_count: usize,
    pub conflicts: Vec<PeerConflict>,
}

/// Group peer requirements by peer name
pub fn collect_requirements(
    published: &[(String, BTreeMap<String, String>)],
) -> BTreeMap<String, Vec<(String, String)>> {
    let mut requirements: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for (package, peers) in published {
        for (peer, range) in peers {
            requirements
                .entry(peer.clone())
                .or_default()
                .push((package.clone(), range.clone()));
        }
    }
    requirements
}

/// Peers requested with more than one distinct range
pub fn find_conflicts(
    requirements: &BTreeMap<String, Vec<(String, String)>>,
) -> Vec<(&str, &[(String, String)])> {
    requirements
        .iter()
        .filter(|(_, reqs)| {
            reqs.iter()
                .map(|(_, range)| range.as_str())
                .collect::<BTreeSet<_>>()
                .len()
                > 1
        })
        .map(|(peer, reqs)| (peer.as_str(), reqs.as_slice()))
        .collect()
}

/// Highest of `versions` admitted by every range. `None` if a range does
/// not parse or no version fits.
pub fn highest_common_version(ranges: &[&str], versions: &[String]) -> Option<String> {
    let ranges: Vec<Range> = ranges
        .iter()
        .map(|r| Range::parse(r))
        .collect::<Result<_, _>>()
        .ok()?;
    let mut candidates: Vec<semver::Version> =
        versions.iter().filter_map(|v| parse_version(v)).collect();
    candidates.sort();

    candidates
        .iter()
        .rev()
        .find(|v| ranges.iter().all(|r| r.satisfies(v)))
        .map(ToString::to_string)
}

fn declared_satisfies(declared: Option<&str>, range: &str) -> Option<bool> {
    let declared = Range::parse(declared?).ok()?.min_version()?;
    Some(Range::parse(range).ok()?.satisfies(&declared))
}

pub async fn resolve_peers(
    project: &Project,
    registry: Arc<dyn PackageRegistry>,
    concurrency: usize,
) -> Result<PeerReport> {
    let dependencies = project.manifest.all_dependencies();
    let requests: Vec<(String, String)> = dependencies
        .iter()
        .filter_map(|(name, spec)| registry_request(name, spec))
        .collect();
    info!("Fetching peer dependencies for {} packages", requests.len());

    let published: Vec<(String, BTreeMap<String, String>)> =
        fetch_manifests(Arc::clone(&registry), requests, concurrency)
            .await
            .into_iter()
            .filter_map(|((name, _), manifest)| Some((name, manifest?.peer_dependencies)))
            .collect();

    let requirements = collect_requirements(&published);
    let mut conflicts = Vec::new();

    for (peer, reqs) in find_conflicts(&requirements) {
        debug!("Peer conflict on {}: {:?}", peer, reqs);
        let declared = dependencies.get(peer).cloned();
        let ranges: Vec<&str> = reqs.iter().map(|(_, range)| range.as_str()).collect();

        let versions = registry.versions(peer).await.unwrap_or_else(|e| {
            warn!("Could not list versions of {}: {}", peer, e);
            Vec::new()
        });
        let latest = match registry.manifest(peer, "latest").await {
            Ok(manifest) => manifest.map(|m| m.version),
            Err(e) => {
                warn!("Could not resolve {}@latest: {}", peer, e);
                None
            }
        };

        let exact = ranges
            .iter()
            .filter(|r| Range::parse(r).map(|r| r.is_exact()).unwrap_or(false))
            .count();

        conflicts.push(PeerConflict {
            peer: peer.to_string(),
            requirements: reqs
                .iter()
                .map(|(required_by, range)| PeerRequirement {
                    required_by: required_by.clone(),
                    range: range.clone(),
                    satisfied: declared_satisfies(declared.as_deref(), range),
                })
                .collect(),
            compatible: highest_common_version(&ranges, &versions),
            declared,
            latest,
            mixed_exact: exact > 0 && exact < ranges.len(),
        });
    }

    Ok(PeerReport {
        project: project.manifest.display_name().to_string(),
        analyzed_dependencies: dependencies.len(),
        peer_count: requirements.len(),
        conflicts,
    })
}

fn conflict_section(conflict: &PeerConflict) -> Section {
    let mut section = Section::new(format!("CONFLICT: {}", conflict.peer));

    let mut required = Finding::warn(format!(
        "Required by {} package(s)",
        conflict.requirements.len()
    ));
    for req in &conflict.requirements {
        let verdict = match req.satisfied {
            Some(true) => " (declared version OK)",
            Some(false) => " (declared version does NOT satisfy)",
            None => "",
        };
        required = required.detail(format!("• {}: {}{}", req.required_by, req.range, verdict));
    }
    section.push(required);

    match &conflict.declared {
        Some(declared) => section.push(Finding::info(format!("Declared in package.json: {}", declared))),
        None => section.push(Finding::info("Not declared in package.json")),
    };
    if conflict.mixed_exact {
        section.push(Finding::warn(
            "Mix of exact and range versions - may be incompatible",
        ));
    }

    match &conflict.compatible {
        Some(version) => section.push(
            Finding::pass(format!("Compatible version: {}@{}", conflict.peer, version))
                .detail(format!("npm install {}@{}", conflict.peer, version)),
        ),
        None => section.push(Finding::fail("No published version satisfies every range")),
    };
    if let Some(latest) = &conflict.latest {
        section.push(
            Finding::info(format!("Latest version: {}@{}", conflict.peer, latest))
                .detail(format!("npm install {}@{}", conflict.peer, latest)),
        );
    }

    section.push(
        Finding::info("Update the requiring packages to their latest versions").details(
            conflict
                .requirements
                .iter()
                .map(|r| format!("npm install {}@latest", r.required_by)),
        ),
    );
    section.push(
        Finding::info("Force a version (npm 8.3+ overrides / Yarn resolutions)")
            .detail(conflict.overrides_snippet())
            .detail(conflict.resolutions_snippet()),
    );
    section
}

impl IntoReport for PeerReport {
    fn to_report(&self) -> Report {
        let mut report =
            Report::new("Peer Dependency Resolver").line(format!("Project: {}", self.project));

        let mut summary = Section::new("SUMMARY");
        if self.conflicts.is_empty() {
            summary.push(Finding::pass(format!(
                "No peer dependency conflicts detected ({} peer dependencies analyzed)",
                self.peer_count
            )));
            return report.section(summary);
        }

        for conflict in &self.conflicts {
            report = report.section(conflict_section(conflict));
        }

        summary.push(Finding::warn(format!(
            "Total conflicts: {}",
            self.conflicts.len()
        )));
        summary.push(Finding::info(format!(
            "Total dependencies analyzed: {}",
            self.analyzed_dependencies
        )));

        report.section(summary).recommend_all([
            "Update all packages to latest compatible versions",
            "Use npm 8.3+ or Yarn for automatic peer dependency installation",
            "Use --legacy-peer-deps as a temporary workaround: npm install --legacy-peer-deps",
            "Use overrides/resolutions to force specific versions",
            "Consider alternative packages with compatible peer deps",
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::fixtures::write;
    use crate::registry::{FakeRegistry, RegistryManifest};
    use tempfile::tempdir;

    fn with_peers(version: &str, peers: &[(&str, &str)]) -> RegistryManifest {
        RegistryManifest {
            version: version.into(),
            peer_dependencies: peers
                .iter()
                .map(|(n, r)| (n.to_string(), r.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_highest_common_version() {
        let versions: Vec<String> = ["17.0.2", "18.2.0", "18.3.1", "19.0.0"]
            .iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(
            highest_common_version(&["^18.0.0", ">=17"], &versions).as_deref(),
            Some("18.3.1")
        );
        assert_eq!(highest_common_version(&["^17", "^19"], &versions), None);
        assert_eq!(highest_common_version(&["not a range"], &versions), None);
    }

    #[test]
    fn test_find_conflicts_needs_distinct_ranges() {
        let published = vec![
            ("a".to_string(), [("react".to_string(), "^18".to_string())].into()),
            ("b".to_string(), [("react".to_string(), "^18".to_string())].into()),
            ("c".to_string(), [("vue".to_string(), "^3".to_string())].into()),
        ];
        let requirements = collect_requirements(&published);
        assert_eq!(requirements.len(), 2);
        assert!(find_conflicts(&requirements).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_peers() {
        let temp = tempdir().unwrap();
        write(
            temp.path(),
            "package.json",
            r#"{"name":"app","dependencies":{"react":"^17.0.2","ui-kit":"^2.0.0","charts":"^1.0.0","local":"file:../local"}}"#,
        );
        let project = Project::load(temp.path()).unwrap();

        let registry = FakeRegistry::new()
            .publish("ui-kit", with_peers("2.1.0", &[("react", ">=17 <19")]))
            .publish("charts", with_peers("1.4.0", &[("react", "^18.0.0")]))
            .publish("react", FakeRegistry::manifest_of("17.0.2"))
            .publish("react", FakeRegistry::manifest_of("18.2.0"))
            .publish("react", FakeRegistry::manifest_of("19.0.0"));

        let report = resolve_peers(&project, Arc::new(registry), 4).await.unwrap();
        assert_eq!(report.analyzed_dependencies, 4);
        assert_eq!(report.conflicts.len(), 1);

        let conflict = &report.conflicts[0];
        assert_eq!(conflict.peer, "react");
        assert_eq!(conflict.compatible.as_deref(), Some("18.2.0"));
        assert_eq!(conflict.latest.as_deref(), Some("19.0.0"));
        assert_eq!(conflict.declared.as_deref(), Some("^17.0.2"));

        let satisfied: Vec<Option<bool>> =
            conflict.requirements.iter().map(|r| r.satisfied).collect();
        assert_eq!(satisfied, [Some(false), Some(true)]);
        assert_eq!(
            conflict.overrides_snippet(),
            r#""overrides": { "react": "18.2.0" }"#
        );

        let text = report.to_report().to_string();
        assert!(text.contains("CONFLICT: react"));
        assert!(text.contains("• charts: ^18.0.0 (declared version does NOT satisfy)"));
        assert!(text.contains("npm install ui-kit@latest"));
    }
}
