//! External process invocation
//!
//! Every shell-out (`cf`, `kubectl`, `docker`, `mvn`, `npm`) goes through a [`CommandRunner`]
//! so that callers can be exercised against a scripted runner in tests.

mod fake;
mod line_wait;

pub use fake::ScriptedRunner;
pub use line_wait::{wait_for_line, RunningProcess};

use async_trait::async_trait;
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::error::{E2eError, Result};

/// A program with its arguments, working directory and extra environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Inherited variables hidden from the child
    pub env_remove: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            env_remove: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Short form used in log lines and matched by [`ScriptedRunner`]
    pub fn render(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn to_tokio(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        for key in &self.env_remove {
            command.env_remove(key);
        }
        command.envs(&self.env);
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn into_result(self, command: &CommandLine) -> Result<CommandOutput> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(E2eError::CommandFailed {
                command: command.render(),
                exit_code: self.exit_code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion. A non-zero exit is reported in the output, not as an
    /// error; only a failure to spawn is an error.
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput>;

    /// Runs the command and fails with [`E2eError::CommandFailed`] on non-zero exit.
    async fn run_checked(&self, command: &CommandLine) -> Result<CommandOutput> {
        self.run(command).await?.into_result(command)
    }

    /// Like [`CommandRunner::run_checked`] with "triggered"/"SUCCESS after" log lines.
    async fn run_operation(&self, operation: &str, command: &CommandLine) -> Result<CommandOutput> {
        let started = Instant::now();
        info!("{} triggered", operation);
        match self.run_checked(command).await {
            Ok(output) => {
                info!("{} SUCCESS after {:.2}s", operation, started.elapsed().as_secs_f64());
                Ok(output)
            }
            Err(e) => {
                error!("{} FAIL: {}", operation, e);
                Err(e)
            }
        }
    }
}

/// Runs commands as real OS processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        debug!("exec: {}", command);
        let output = command.to_tokio().output().await;
        match output {
            Ok(output) => Ok(CommandOutput {
                // Killed by a signal has no code
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Err(e) => Err(E2eError::CommandFailed {
                command: command.render(),
                exit_code: -1,
                stdout: String::new(),
                stderr: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_joins_program_and_args() {
        let command = CommandLine::new("cf")
            .args(["push", "java-ams"])
            .arg("--var")
            .arg("ID=space");
        assert_eq!(command.render(), "cf push java-ams --var ID=space");
    }

    #[test]
    fn test_non_zero_exit_becomes_command_failed() {
        let command = CommandLine::new("mvn").arg("package");
        let output = CommandOutput {
            exit_code: 2,
            stdout: "BUILD FAILURE".into(),
            stderr: "boom".into(),
        };
        match output.into_result(&command) {
            Err(E2eError::CommandFailed {
                command,
                exit_code,
                stdout,
                stderr,
            }) => {
                assert_eq!(command, "mvn package");
                assert_eq!(exit_code, 2);
                assert_eq!(stdout, "BUILD FAILURE");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemRunner;
        let output = runner
            .run(&CommandLine::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_runner_checked_raises() {
        let runner = SystemRunner;
        let err = runner
            .run_checked(&CommandLine::new("sh").args(["-c", "exit 1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::CommandFailed { exit_code: 1, .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_command_failed() {
        let runner = SystemRunner;
        let err = runner
            .run(&CommandLine::new("definitely-not-a-real-binary-4711"))
            .await
            .unwrap_err();
        assert!(matches!(err, E2eError::CommandFailed { exit_code: -1, .. }));
    }
}
