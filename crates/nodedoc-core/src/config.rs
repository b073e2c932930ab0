//! Settings loading
//!
//! Settings come from two TOML files, both optional:
//! - Global: `~/.nodedoc/config.toml`
//! - Project: `<project>/.nodedoc.toml`
//!
//! Project tables override global tables key by key.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::paths;

/// Effective settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub registry: RegistrySettings,
    pub display: DisplaySettings,
    pub checks: CheckSettings,
    pub skills: SkillSettings,
}

/// Registry lookups (`npm view`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Program used for registry and audit commands
    pub npm_command: String,
    /// Maximum registry lookups in flight
    pub concurrency: usize,
    /// Per-command timeout
    pub timeout_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            npm_command: "npm".to_string(),
            concurrency: 8,
            timeout_secs: 30,
        }
    }
}

impl RegistrySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Report truncation limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Entries listed per section before "... and N more"
    pub max_items: usize,
    /// Paths listed per package version
    pub max_paths: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            max_items: 10,
            max_paths: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    /// Run `npx expo-doctor` during `diagnose` for Expo projects
    pub run_expo_doctor: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            run_expo_doctor: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillSettings {
    /// Project-relative directories searched for skills
    pub project_dirs: Vec<String>,
}

impl Default for SkillSettings {
    fn default() -> Self {
        Self {
            project_dirs: vec![".claude/skills".to_string(), "skills".to_string()],
        }
    }
}

impl Settings {
    /// Load global settings, then overlay the project file if present
    pub fn load(project_dir: &Path) -> Result<Self> {
        Self::load_from(
            &paths::global_config_path(),
            &paths::project_config_path(project_dir),
        )
    }

    /// Load from explicit paths (missing files are skipped)
    pub fn load_from(global: &Path, project: &Path) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in [global, project] {
            if let Some(table) = read_table(path)? {
                overlay(&mut merged, table);
            }
        }

        let settings: Settings = toml::Value::Table(merged)
            .try_into()
            .context("Invalid settings")?;
        Ok(settings)
    }

    /// Render as TOML for `config show`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }
}

fn read_table(path: &Path) -> Result<Option<toml::Table>> {
    if !path.is_file() {
        tracing::debug!("No settings file at {:?}", path);
        return Ok(None);
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let table: toml::Table =
        toml::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))?;

    tracing::debug!("Loaded settings from {:?}", path);
    Ok(Some(table))
}

/// Merge `overlay` into `base`, recursing into nested tables
fn overlay(base: &mut toml::Table, overlay_table: toml::Table) {
    for (key, value) in overlay_table {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                overlay(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
