//! Domain errors for the core library

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by parsing and validation code
///
/// Orchestration code wraps these in `anyhow` with context; callers that need
/// to branch on the failure (the CLI, tests) can downcast.
#[derive(Debug, Error)]
pub enum DoctorError {
    #[error("package.json not found in {0:?}")]
    ManifestNotFound(PathBuf),

    #[error("invalid package.json at {path:?}: {source}")]
    InvalidManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unsupported lock file: {0:?} (expected package-lock.json, yarn.lock or pnpm-lock.yaml)")]
    UnsupportedLockfile(PathBuf),

    #[error("malformed lock file {path:?}: {message}")]
    MalformedLockfile { path: PathBuf, message: String },

    #[error("invalid version range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },

    #[error("invalid {kind} pattern '{pattern}' for skill '{skill}': {reason}")]
    InvalidTrigger {
        skill: String,
        kind: &'static str,
        pattern: String,
        reason: String,
    },

    #[error("skill '{0}' not found")]
    SkillNotFound(String),

    #[error("`{command}` failed: {message}")]
    CommandFailed { command: String, message: String },
}

impl DoctorError {
    pub(crate) fn invalid_range(range: &str, reason: impl Into<String>) -> Self {
        DoctorError::InvalidRange {
            range: range.to_string(),
            reason: reason.into(),
        }
    }
}
