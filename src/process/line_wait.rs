use log::{debug, info, warn};
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;

use super::CommandLine;
use crate::error::{E2eError, Result};

/// A long-running child process; killed when dropped
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    command: String,
}

impl RunningProcess {
    pub async fn terminate(mut self) -> Result<()> {
        info!("terminating {}", self.command);
        match self.child.start_kill() {
            Ok(()) => {}
            // Already exited and reaped
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => debug!("{} already exited", self.command),
            Err(e) => warn!("failed to kill {}: {}", self.command, e),
        }
        self.child.wait().await?;
        Ok(())
    }
}

/// Spawns `command` and reads its stdout until a line matches `pattern`.
///
/// Returns the first capture group of the matching line (or the whole match) together with the
/// still running process. Fails when the process exits or `timeout` elapses first.
pub async fn wait_for_line(
    command: &CommandLine,
    pattern: &Regex,
    timeout: Duration,
) -> Result<(String, RunningProcess)> {
    let mut child = command
        .to_tokio()
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| E2eError::CommandFailed {
            command: command.render(),
            exit_code: -1,
            stdout: String::new(),
            stderr: e.to_string(),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| E2eError::Precondition(format!("no stdout for {}", command)))?;
    let mut lines = BufReader::new(stdout).lines();

    let scan = async {
        while let Some(line) = lines.next_line().await? {
            debug!("{}", line);
            if let Some(captures) = pattern.captures(&line) {
                let value = captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                return Ok(Some(value));
            }
        }
        Ok::<_, E2eError>(None)
    };

    let found = match tokio::time::timeout(timeout, scan).await {
        Ok(result) => result?,
        Err(_) => None,
    };

    let process = RunningProcess {
        child,
        command: command.render(),
    };
    match found {
        Some(value) => Ok((value, process)),
        None => {
            process.terminate().await?;
            Err(E2eError::Precondition(format!(
                "`{}` did not print a line matching '{}' within {}s",
                command,
                pattern,
                timeout.as_secs()
            )))
        }
    }
}
