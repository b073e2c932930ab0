//! Registry lookups through `npm view --json`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{PackageRegistry, RegistryManifest};
use crate::error::DoctorError;
use crate::process::CommandRunner;
use crate::versions::parse_version;

/// npm error codes meaning "no such package/version" rather than a failure
const NOT_FOUND_CODES: [&str; 2] = ["E404", "ETARGET"];

pub struct NpmCliRegistry {
    runner: Arc<dyn CommandRunner>,
    npm: String,
    cwd: PathBuf,
}

impl NpmCliRegistry {
    pub fn new(runner: Arc<dyn CommandRunner>, npm: impl Into<String>, cwd: PathBuf) -> Self {
        Self {
            runner,
            npm: npm.into(),
            cwd,
        }
    }

    /// Run `npm view <args> --json`; `None` for not-found errors
    async fn view(&self, args: &[&str]) -> Result<Option<Value>> {
        let mut full_args = vec!["view"];
        full_args.extend_from_slice(args);
        full_args.push("--json");

        let output = self.runner.run(&self.npm, &full_args, &self.cwd).await?;

        if !output.success() {
            let combined = format!("{}\n{}", output.stdout, output.stderr);
            if NOT_FOUND_CODES.iter().any(|code| combined.contains(code)) {
                debug!("npm view {:?}: not found", args);
                return Ok(None);
            }
            return Err(DoctorError::CommandFailed {
                command: format!("{} {}", self.npm, full_args.join(" ")),
                message: output.stderr,
            }
            .into());
        }

        // A range that matches nothing prints nothing
        if output.stdout.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&output.stdout)
            .with_context(|| format!("Invalid JSON from npm view {:?}", args))?;
        Ok(Some(value))
    }
}

#[async_trait]
impl PackageRegistry for NpmCliRegistry {
    async fn manifest(&self, name: &str, spec: &str) -> Result<Option<RegistryManifest>> {
        let target = format!("{}@{}", name, spec);
        let Some(value) = self.view(&[target.as_str()]).await? else {
            return Ok(None);
        };
        pick_manifest(value)
    }

    async fn versions(&self, name: &str) -> Result<Vec<String>> {
        let Some(value) = self.view(&[name, "versions"]).await? else {
            return Ok(Vec::new());
        };
        Ok(match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Value::String(single) => vec![single],
            _ => Vec::new(),
        })
    }
}

/// A range matching several versions yields an array; take the highest
fn pick_manifest(value: Value) -> Result<Option<RegistryManifest>> {
    let candidates: Vec<RegistryManifest> = match value {
        Value::Array(items) => items
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()
            .context("Unexpected npm view output")?,
        object @ Value::Object(_) => {
            vec![serde_json::from_value(object).context("Unexpected npm view output")?]
        }
        _ => return Ok(None),
    };

    Ok(candidates
        .into_iter()
        .max_by_key(|m| parse_version(&m.version)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, FakeRunner};

    fn registry(runner: FakeRunner) -> NpmCliRegistry {
        NpmCliRegistry::new(Arc::new(runner), "npm", PathBuf::from("."))
    }

    #[tokio::test]
    async fn test_manifest_picks_highest_of_array() {
        let runner = FakeRunner::new().respond(
            "npm view react@^18 --json",
            CommandOutput::ok(r#"[{"version":"18.0.0"},{"version":"18.3.1"},{"version":"18.2.0"}]"#),
        );
        let manifest = registry(runner).manifest("react", "^18").await.unwrap().unwrap();
        assert_eq!(manifest.version, "18.3.1");
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let runner = FakeRunner::new().respond(
            "npm view nope@latest --json",
            CommandOutput {
                code: Some(1),
                stdout: r#"{"error":{"code":"E404"}}"#.into(),
                stderr: "npm ERR! code E404".into(),
            },
        );
        assert!(registry(runner).manifest("nope", "latest").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_other_failures_are_errors() {
        let runner = FakeRunner::new().respond(
            "npm view react@latest --json",
            CommandOutput::failed(1, "npm ERR! code ECONNREFUSED"),
        );
        assert!(registry(runner).manifest("react", "latest").await.is_err());
    }

    #[tokio::test]
    async fn test_versions_string_or_array() {
        let runner = FakeRunner::new()
            .respond(
                "npm view left-pad versions --json",
                CommandOutput::ok(r#"["1.0.0","1.1.0"]"#),
            )
            .respond("npm view solo versions --json", CommandOutput::ok(r#""0.1.0""#));
        let registry = registry(runner);
        assert_eq!(registry.versions("left-pad").await.unwrap(), ["1.0.0", "1.1.0"]);
        assert_eq!(registry.versions("solo").await.unwrap(), ["0.1.0"]);
    }
}
