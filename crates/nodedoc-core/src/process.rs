//! External command execution
//!
//! Everything that shells out (tool versions, `npm view`, `npm audit`,
//! `npx expo-doctor`) goes through [`CommandRunner`] so checks can be
//! exercised with canned output.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::DoctorError;

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program args...` in `cwd`. A program that cannot be spawned or
    /// times out is an error; a non-zero exit is not.
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput>;
}

/// Runs real processes with a timeout
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput> {
        let command_line = format!("{} {}", program, args.join(" "));
        debug!("Running `{}` in {:?}", command_line, cwd);

        let mut command = Command::new(program);
        command.args(args).current_dir(cwd).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| DoctorError::CommandFailed {
                command: command_line.clone(),
                message: e.to_string(),
            })?,
            Err(_) => {
                return Err(DoctorError::CommandFailed {
                    command: command_line,
                    message: format!("timed out after {}s", self.timeout.as_secs()),
                }
                .into())
            }
        };

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Canned responses keyed by the full command line, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct FakeRunner {
    responses: std::collections::HashMap<String, CommandOutput>,
    calls: std::sync::Mutex<Vec<(String, std::path::PathBuf)>>,
}

#[cfg(test)]
impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command_line: &str, output: CommandOutput) -> Self {
        self.responses.insert(command_line.to_string(), output);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.iter().map(|(c, _)| c.clone()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<CommandOutput> {
        let command_line = format!("{} {}", program, args.join(" "));
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((command_line.clone(), cwd.to_path_buf()));
        }
        self.responses.get(&command_line).cloned().ok_or_else(|| {
            DoctorError::CommandFailed {
                command: command_line,
                message: "not found".to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program_is_an_error() {
        let runner = SystemRunner::new(Duration::from_secs(5));
        let result = runner
            .run("nodedoc-definitely-not-a-program", &["--version"], Path::new("."))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fake_runner_records_calls() {
        let runner = FakeRunner::new().respond("node --version", CommandOutput::ok("v20.11.1"));
        let output = runner.run("node", &["--version"], Path::new(".")).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "v20.11.1");
        assert!(runner.run("yarn", &["--version"], Path::new(".")).await.is_err());
        assert_eq!(runner.calls(), ["node --version", "yarn --version"]);
    }
}
