//! Production dependency weight from published `dist.unpackedSize`

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use super::{registry_request, Project};
use crate::constants::{BUNDLE_TOP_N, HEAVY_PACKAGE_BYTES};
use crate::registry::{fetch_manifests, PackageRegistry};
use crate::report::{Finding, IntoReport, Report, Section};

/// Heavy packages listed by name
const HEAVY_SHOWN: usize = 5;

/// Human readable size with one decimal for KB and MB
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageSize {
    pub package: String,
    pub spec: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleReport {
    pub analyzed: usize,
    pub total_bytes: u64,
    /// Largest first
    pub sizes: Vec<PackageSize>,
    /// Dependencies without a published size
    pub unknown: Vec<String>,
}

impl BundleReport {
    pub fn from_sizes(analyzed: usize, mut sizes: Vec<PackageSize>, unknown: Vec<String>) -> Self {
        sizes.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.package.cmp(&b.package)));
        Self {
            analyzed,
            total_bytes: sizes.iter().map(|s| s.bytes).sum(),
            sizes,
            unknown,
        }
    }

    pub fn heavy(&self) -> impl Iterator<Item = &PackageSize> {
        self.sizes.iter().filter(|s| s.bytes > HEAVY_PACKAGE_BYTES)
    }

    pub fn percentage(&self, size: &PackageSize) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            size.bytes as f64 / self.total_bytes as f64 * 100.0
        }
    }
}

pub async fn analyze_bundle(
    project: &Project,
    registry: Arc<dyn PackageRegistry>,
    concurrency: usize,
) -> Result<BundleReport> {
    let dependencies = &project.manifest.dependencies;
    let requests: Vec<(String, String)> = dependencies
        .iter()
        .filter_map(|(name, spec)| registry_request(name, spec))
        .collect();
    info!("Fetching sizes for {} dependencies", requests.len());

    let mut sizes = Vec::new();
    let mut unknown = Vec::new();
    for ((package, spec), manifest) in fetch_manifests(registry, requests, concurrency).await {
        match manifest.and_then(|m| m.dist.unpacked_size) {
            Some(bytes) if bytes > 0 => sizes.push(PackageSize {
                package,
                spec,
                bytes,
            }),
            _ => unknown.push(package),
        }
    }

    Ok(BundleReport::from_sizes(dependencies.len(), sizes, unknown))
}

impl IntoReport for BundleReport {
    fn to_report(&self) -> Report {
        let report = Report::new("Bundle Size Analyzer")
            .line(format!("Analyzing {} dependencies...", self.analyzed));

        if self.sizes.is_empty() {
            return report.section(
                Section::new("Sizes").with(Finding::skip("Could not determine package sizes")),
            );
        }

        let width = self
            .sizes
            .iter()
            .take(BUNDLE_TOP_N)
            .map(|s| s.package.len())
            .max()
            .unwrap_or(0)
            .max(30);
        let mut largest = Section::new(format!("TOTAL SIZE: {}", format_size(self.total_bytes)));
        largest.push(
            Finding::info("Largest dependencies").details(
                self.sizes
                    .iter()
                    .take(BUNDLE_TOP_N)
                    .enumerate()
                    .map(|(i, size)| {
                        format!(
                            "{:2}. {:<width$} {:>10} ({:5.1}%)",
                            i + 1,
                            size.package,
                            format_size(size.bytes),
                            self.percentage(size),
                            width = width
                        )
                    }),
            ),
        );

        let heavy: Vec<&PackageSize> = self.heavy().collect();
        if !heavy.is_empty() {
            largest.push(
                Finding::warn(format!("{} package(s) over 1 MB", heavy.len())).details(
                    heavy
                        .iter()
                        .take(HEAVY_SHOWN)
                        .map(|s| format!("• {}: {}", s.package, format_size(s.bytes))),
                ),
            );
        }
        if !self.unknown.is_empty() {
            largest.push(
                Finding::skip(format!("No size published for {} package(s)", self.unknown.len()))
                    .detail(self.unknown.join(", ")),
            );
        }

        report.section(largest).recommend_all([
            "Consider lighter alternatives for heavy packages",
            "Use bundler tree-shaking to remove unused code",
            "Check bundlephobia.com for package analysis",
        ])
    }
}
