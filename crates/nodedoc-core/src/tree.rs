//! Dependency tree visualisation from a lock file

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::lockfile::{Lockfile, PackageInstance};
use crate::report::{Finding, IntoReport, Report, Section};

/// What to include in the rendered tree
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    /// Show only this package
    pub focus: Option<String>,
    /// Hide packages installed at a single version
    pub duplicates_only: bool,
    /// Hide instances nested deeper than this
    pub max_depth: Option<usize>,
    /// Paths shown per version before truncating
    pub max_paths: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeStats {
    pub unique_packages: usize,
    pub total_instances: usize,
    pub packages_with_duplicates: usize,
    pub max_depth: usize,
    pub average_depth: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeVersion {
    pub version: String,
    pub instances: Vec<PackageInstance>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub duplicate: bool,
    pub versions: Vec<TreeVersion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyTree {
    pub lockfile: String,
    pub focus: Option<String>,
    pub stats: TreeStats,
    pub nodes: Vec<TreeNode>,
    #[serde(skip)]
    max_paths: usize,
}

/// Statistics over the whole lock file (independent of filters)
pub fn compute_stats(lockfile: &Lockfile) -> TreeStats {
    let grouped = lockfile.by_name();
    let depths: Vec<usize> = lockfile.instances.iter().map(|i| i.depth).collect();

    let packages_with_duplicates = grouped
        .values()
        .filter(|instances| {
            instances
                .iter()
                .map(|i| i.version.as_str())
                .collect::<BTreeSet<_>>()
                .len()
                > 1
        })
        .count();

    let average_depth = if depths.is_empty() {
        0.0
    } else {
        depths.iter().sum::<usize>() as f64 / depths.len() as f64
    };

    TreeStats {
        unique_packages: grouped.len(),
        total_instances: lockfile.instances.len(),
        packages_with_duplicates,
        max_depth: depths.iter().copied().max().unwrap_or(0),
        average_depth,
    }
}

/// Build the filtered tree
pub fn build_tree(lockfile: &Lockfile, options: &TreeOptions) -> DependencyTree {
    let mut nodes = Vec::new();

    for (name, instances) in lockfile.by_name() {
        if let Some(focus) = &options.focus {
            if focus != name {
                continue;
            }
        }

        let mut by_version: BTreeMap<&str, Vec<PackageInstance>> = BTreeMap::new();
        for instance in &instances {
            by_version
                .entry(instance.version.as_str())
                .or_default()
                .push((*instance).clone());
        }

        let duplicate = by_version.len() > 1;
        if options.duplicates_only && !duplicate {
            continue;
        }

        let versions: Vec<TreeVersion> = by_version
            .into_iter()
            .filter_map(|(version, instances)| {
                let instances: Vec<PackageInstance> = instances
                    .into_iter()
                    .filter(|i| options.max_depth.map_or(true, |max| i.depth <= max))
                    .collect();
                (!instances.is_empty()).then(|| TreeVersion {
                    version: version.to_string(),
                    instances,
                })
            })
            .collect();

        if versions.is_empty() {
            continue;
        }

        nodes.push(TreeNode {
            name: name.to_string(),
            duplicate,
            versions,
        });
    }

    DependencyTree {
        lockfile: lockfile.path.display().to_string(),
        focus: options.focus.clone(),
        stats: compute_stats(lockfile),
        nodes,
        max_paths: options.max_paths.max(1),
    }
}

fn trim_node_modules(path: &str) -> &str {
    path.strip_prefix("node_modules/").unwrap_or(path)
}

impl DependencyTree {
    /// ASCII rendering, one block per package
    pub fn render_nodes(&self) -> Vec<String> {
        let mut lines = Vec::new();

        for node in &self.nodes {
            let marker = if node.duplicate { "⚠ " } else { "  " };
            lines.push(format!("{}{}", marker, node.name));

            let version_count = node.versions.len();
            for (i, version) in node.versions.iter().enumerate() {
                let last_version = i + 1 == version_count;
                let branch = if last_version { "└─" } else { "├─" };
                let count = version.instances.len();
                lines.push(format!(
                    "  {} {} ({} instance{})",
                    branch,
                    version.version,
                    count,
                    if count == 1 { "" } else { "s" }
                ));

                let stem = if last_version { "   " } else { "   │" };
                let shown = count.min(self.max_paths);
                for (j, instance) in version.instances.iter().take(shown).enumerate() {
                    let leaf = if j + 1 == shown && count <= self.max_paths {
                        "└─"
                    } else {
                        "├─"
                    };
                    lines.push(format!(
                        "{} {} {}{}",
                        stem,
                        leaf,
                        "  ".repeat(instance.depth),
                        trim_node_modules(&instance.path)
                    ));
                }
                if count > self.max_paths {
                    lines.push(format!(
                        "{} └─ ... and {} more",
                        stem,
                        count - self.max_paths
                    ));
                }
            }
            lines.push(String::new());
        }

        lines
    }
}

impl IntoReport for DependencyTree {
    fn to_report(&self) -> Report {
        let mut report = Report::new("Dependency Tree Visualizer")
            .line(format!("Analyzing: {}", self.lockfile));
        if let Some(focus) = &self.focus {
            report = report.line(format!("Focusing on: {}", focus));
        }

        let stats = &self.stats;
        report = report.section(
            Section::new("STATISTICS")
                .with(Finding::info(format!(
                    "Total unique packages: {}",
                    stats.unique_packages
                )))
                .with(Finding::info(format!(
                    "Total package instances: {}",
                    stats.total_instances
                )))
                .with(Finding::info(format!(
                    "Packages with duplicates: {}",
                    stats.packages_with_duplicates
                )))
                .with(Finding::info(format!(
                    "Max dependency depth: {}",
                    stats.max_depth
                )))
                .with(Finding::info(format!(
                    "Average depth: {:.1}",
                    stats.average_depth
                ))),
        );

        let tree_section = if self.nodes.is_empty() {
            let message = match &self.focus {
                Some(focus) => format!("Package '{}' not found in dependency tree", focus),
                None => "No dependencies found".to_string(),
            };
            Section::new("DEPENDENCY TREE").with(Finding::skip(message))
        } else {
            Section::new("DEPENDENCY TREE").with(
                Finding::info("⚠ marks packages installed at multiple versions")
                    .details(self.render_nodes()),
            )
        };
        report = report.section(tree_section);

        if stats.packages_with_duplicates > 0 {
            report = report
                .recommend(format!(
                    "Found {} package(s) with duplicate versions; deduplicate with npm dedupe, yarn dedupe or pnpm dedupe",
                    stats.packages_with_duplicates
                ))
                .recommend("For specific packages, use overrides in package.json");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockfileKind;
    use std::path::PathBuf;

    fn lockfile() -> Lockfile {
        let instance = |name: &str, version: &str, path: &str, depth| PackageInstance {
            name: name.into(),
            version: version.into(),
            path: path.into(),
            depth,
        };
        Lockfile {
            kind: LockfileKind::Npm,
            path: PathBuf::from("package-lock.json"),
            instances: vec![
                instance("lodash", "4.17.21", "node_modules/lodash", 0),
                instance("lodash", "4.17.20", "node_modules/a/node_modules/lodash", 1),
                instance(
                    "lodash",
                    "4.17.20",
                    "node_modules/a/node_modules/b/node_modules/lodash",
                    2,
                ),
                instance("react", "18.2.0", "node_modules/react", 0),
            ],
        }
    }

    #[test]
    fn test_stats() {
        let stats = compute_stats(&lockfile());
        assert_eq!(stats.unique_packages, 2);
        assert_eq!(stats.total_instances, 4);
        assert_eq!(stats.packages_with_duplicates, 1);
        assert_eq!(stats.max_depth, 2);
        assert!((stats.average_depth - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duplicates_only_and_focus() {
        let lock = lockfile();
        let tree = build_tree(
            &lock,
            &TreeOptions {
                duplicates_only: true,
                max_paths: 5,
                ..Default::default()
            },
        );
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].name, "lodash");

        let focused = build_tree(
            &lock,
            &TreeOptions {
                focus: Some("react".into()),
                max_paths: 5,
                ..Default::default()
            },
        );
        assert_eq!(focused.nodes.len(), 1);
        assert!(!focused.nodes[0].duplicate);
    }

    #[test]
    fn test_max_depth_filters_instances() {
        let tree = build_tree(
            &lockfile(),
            &TreeOptions {
                focus: Some("lodash".into()),
                max_depth: Some(1),
                max_paths: 5,
                ..Default::default()
            },
        );
        let old = &tree.nodes[0].versions[0];
        assert_eq!(old.version, "4.17.20");
        assert_eq!(old.instances.len(), 1);
    }

    #[test]
    fn test_render_trims_node_modules_prefix() {
        let tree = build_tree(
            &lockfile(),
            &TreeOptions {
                focus: Some("lodash".into()),
                max_paths: 1,
                ..Default::default()
            },
        );
        let lines = tree.render_nodes();
        assert_eq!(lines[0], "⚠ lodash");
        assert!(lines.iter().any(|l| l.contains("4.17.20 (2 instances)")));
        assert!(lines.iter().any(|l| l.ends_with("  a/node_modules/lodash")));
        assert!(lines.iter().any(|l| l.contains("... and 1 more")));
    }

    #[test]
    fn test_missing_focus_reports_not_found() {
        let tree = build_tree(
            &lockfile(),
            &TreeOptions {
                focus: Some("vue".into()),
                max_paths: 3,
                ..Default::default()
            },
        );
        let text = tree.to_report().to_string();
        assert!(text.contains("Package 'vue' not found"));
    }
}
