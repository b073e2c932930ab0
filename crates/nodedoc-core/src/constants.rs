//! Shared constants

/// Directory name under the home directory for global state (~/.nodedoc)
pub const CONFIG_DIR_NAME: &str = ".nodedoc";

/// Global settings file name inside the config directory
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Project-level settings file name
pub const PROJECT_CONFIG_FILE_NAME: &str = ".nodedoc.toml";

/// File name every skill directory must contain
pub const SKILL_FILE_NAME: &str = "SKILL.md";

/// Trigger rules file name
pub const SKILL_RULES_FILE_NAME: &str = "skill-rules.json";

/// Lock file names, in detection priority order
pub mod lockfiles {
    pub const PNPM: &str = "pnpm-lock.yaml";
    pub const YARN: &str = "yarn.lock";
    pub const NPM: &str = "package-lock.json";
}

/// Width of the `=` banners in rendered reports
pub const BANNER_WIDTH: usize = 70;

/// Packages above this unpacked size are flagged as heavy (1 MB)
pub const HEAVY_PACKAGE_BYTES: u64 = 1024 * 1024;

/// How many of the largest dependencies the bundle report lists
pub const BUNDLE_TOP_N: usize = 15;
