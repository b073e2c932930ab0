//! npm registry access
//!
//! Checks that need published metadata (peer dependencies, latest versions,
//! tarball sizes) go through [`PackageRegistry`]. The production
//! implementation shells out to `npm view`, which honours the user's
//! `.npmrc`, registry mirrors and auth.

mod npm_cli;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use npm_cli::NpmCliRegistry;

/// Published metadata for one version of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryManifest {
    #[serde(default)]
    pub name: Option<String>,
    pub version: String,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dist: Dist,
    #[serde(default)]
    pub repository: Option<Repository>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dist {
    #[serde(default)]
    pub unpacked_size: Option<u64>,
}

/// `repository` is either a string or `{ "type": "git", "url": "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Repository {
    Url(String),
    Object {
        #[serde(default)]
        url: Option<String>,
    },
}

impl Repository {
    pub fn url(&self) -> Option<&str> {
        match self {
            Repository::Url(url) => Some(url),
            Repository::Object { url } => url.as_deref(),
        }
    }
}

/// Source of published package metadata
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Manifest of the highest version matching `spec` (a range or dist-tag).
    /// `Ok(None)` when the package or a matching version does not exist.
    async fn manifest(&self, name: &str, spec: &str) -> Result<Option<RegistryManifest>>;

    /// All published versions, oldest first
    async fn versions(&self, name: &str) -> Result<Vec<String>>;
}

/// Look up manifests for many `(name, spec)` pairs with bounded concurrency.
///
/// Failed lookups are logged and returned as `None`; results keep input order.
pub async fn fetch_manifests(
    registry: Arc<dyn PackageRegistry>,
    requests: Vec<(String, String)>,
    concurrency: usize,
) -> Vec<((String, String), Option<RegistryManifest>)> {
    let mut results: Vec<(usize, (String, String), Option<RegistryManifest>)> =
        stream::iter(requests.into_iter().enumerate())
            .map(|(index, (name, spec))| {
                let registry = Arc::clone(&registry);
                async move {
                    let manifest = match registry.manifest(&name, &spec).await {
                        Ok(manifest) => manifest,
                        Err(e) => {
                            warn!("Registry lookup failed for {}@{}: {}", name, spec, e);
                            None
                        }
                    };
                    (index, (name, spec), manifest)
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, request, manifest)| (request, manifest))
        .collect()
}

/// In-memory registry for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeRegistry {
    packages: BTreeMap<String, Vec<RegistryManifest>>,
    tags: BTreeMap<(String, String), String>,
}

#[cfg(test)]
impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(mut self, name: &str, manifest: RegistryManifest) -> Self {
        let versions = self.packages.entry(name.to_string()).or_default();
        versions.push(manifest);
        versions.sort_by_key(|m| crate::versions::parse_version(&m.version));
        self
    }

    pub fn tag(mut self, name: &str, tag: &str, version: &str) -> Self {
        self.tags
            .insert((name.to_string(), tag.to_string()), version.to_string());
        self
    }

    pub fn manifest_of(version: &str) -> RegistryManifest {
        RegistryManifest {
            version: version.to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
#[async_trait]
impl PackageRegistry for FakeRegistry {
    async fn manifest(&self, name: &str, spec: &str) -> Result<Option<RegistryManifest>> {
        let Some(published) = self.packages.get(name) else {
            return Ok(None);
        };

        let tagged = self
            .tags
            .get(&(name.to_string(), spec.to_string()))
            .cloned()
            .or_else(|| {
                if spec == "latest" {
                    published.last().map(|m| m.version.clone())
                } else {
                    None
                }
            });
        if let Some(version) = tagged {
            return Ok(published.iter().find(|m| m.version == version).cloned());
        }

        let range = crate::versions::Range::parse(spec)?;
        Ok(published
            .iter()
            .rev()
            .find(|m| {
                crate::versions::parse_version(&m.version)
                    .map(|v| range.satisfies(&v))
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn versions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .packages
            .get(name)
            .map(|published| published.iter().map(|m| m.version.clone()).collect())
            .unwrap_or_default())
    }
}
