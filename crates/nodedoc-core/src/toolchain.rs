//! Installed Node.js toolchain and platform detection

use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::process::CommandRunner;

/// Tools whose versions are probed, in display order
pub const TOOLS: [&str; 4] = ["node", "npm", "yarn", "pnpm"];

/// Versions of the Node.js toolchain found on PATH
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolVersions {
    pub node: Option<String>,
    pub npm: Option<String>,
    pub yarn: Option<String>,
    pub pnpm: Option<String>,
}

impl ToolVersions {
    /// Probe all tools concurrently with `<tool> --version`
    pub async fn detect(runner: &dyn CommandRunner, cwd: &Path) -> Self {
        let (node, npm, yarn, pnpm) = tokio::join!(
            probe(runner, "node", cwd),
            probe(runner, "npm", cwd),
            probe(runner, "yarn", cwd),
            probe(runner, "pnpm", cwd),
        );
        let versions = Self {
            node,
            npm,
            yarn,
            pnpm,
        };
        debug!("Detected toolchain: {:?}", versions);
        versions
    }

    /// Version of a tool by its engines key
    pub fn get(&self, tool: &str) -> Option<&str> {
        match tool {
            "node" => self.node.as_deref(),
            "npm" => self.npm.as_deref(),
            "yarn" => self.yarn.as_deref(),
            "pnpm" => self.pnpm.as_deref(),
            _ => None,
        }
    }

    /// Whether `tool` is one this module knows how to probe
    pub fn is_known(tool: &str) -> bool {
        TOOLS.contains(&tool)
    }
}

async fn probe(runner: &dyn CommandRunner, tool: &str, cwd: &Path) -> Option<String> {
    match runner.run(tool, &["--version"], cwd).await {
        Ok(output) if output.success() => {
            let version = output.stdout.lines().next()?.trim().trim_start_matches('v');
            (!version.is_empty()).then(|| version.to_string())
        }
        Ok(output) => {
            debug!("{} --version exited with {:?}", tool, output.code);
            None
        }
        Err(e) => {
            debug!("{} not available: {}", tool, e);
            None
        }
    }
}

/// Current platform using npm's `os` / `cpu` vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn current() -> Self {
        Self {
            os: npm_os(std::env::consts::OS).to_string(),
            arch: npm_arch(std::env::consts::ARCH).to_string(),
        }
    }
}

/// Map a Rust target OS name to `process.platform`
pub fn npm_os(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

/// Map a Rust target arch name to `process.arch`
pub fn npm_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        other => other,
    }
}
