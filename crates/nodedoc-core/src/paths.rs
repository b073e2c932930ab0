//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::{Path, PathBuf};

use crate::constants::{CONFIG_DIR_NAME, CONFIG_FILE_NAME, PROJECT_CONFIG_FILE_NAME};

/// Get the nodedoc config directory (~/.nodedoc)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the global settings file (~/.nodedoc/config.toml)
pub fn global_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

/// Get the project settings file (<project>/.nodedoc.toml)
pub fn project_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(PROJECT_CONFIG_FILE_NAME)
}

/// Get the global skills directory (~/.nodedoc/skills)
pub fn skills_dir() -> PathBuf {
    config_dir().join("skills")
}

/// Render a path relative to `base` with forward slashes, for display and
/// glob matching
pub fn display_relative(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
