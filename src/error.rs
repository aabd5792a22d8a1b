//! Error taxonomy shared by every layer of the tool
//!
//! Command handlers wrap these in `anyhow::Error` for context; the orchestrator and the
//! tests match on the variants directly.

use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = E2eError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum E2eError {
    /// An external process exited with a non-zero code or could not be spawned.
    #[error("command `{command}` failed with exit code {exit_code}:\n{stdout}{stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// An HTTP call answered with something other than the single expected status.
    /// `actual` is `None` when no response was obtained at all.
    #[error("{method} {url}: expected HTTP {expected}, got {}: {body}", display_status(.actual))]
    UnexpectedStatus {
        method: String,
        url: String,
        expected: u16,
        actual: Option<u16>,
        body: String,
    },

    /// A request that is inspected rather than asserted never produced a response.
    #[error("{method} {url} failed: {message}")]
    Transport {
        method: String,
        url: String,
        message: String,
    },

    #[error("timeout while polling for {operation} after {attempts} attempts ({:.2}s): {last}", .elapsed.as_secs_f64())]
    PollTimeout {
        operation: String,
        attempts: u32,
        elapsed: Duration,
        last: String,
    },

    #[error("creation of service instance '{instance}' ended in state '{state}': {description}")]
    CreationFailed {
        instance: String,
        state: String,
        description: String,
    },

    #[error("job {job} failed: {errors}")]
    JobFailed { job: String, errors: String },

    #[error("ENV \"{key}\" not found, {hint}")]
    MissingConfig { key: String, hint: String },

    #[error("credential '{key}' missing in {service} credentials")]
    MissingCredential { service: String, key: String },

    #[error("{0}")]
    Precondition(String),

    #[error("could not parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

fn display_status(actual: &Option<u16>) -> String {
    match actual {
        Some(code) => code.to_string(),
        None => "no response".to_string(),
    }
}

impl E2eError {
    pub fn missing_config(key: &str) -> Self {
        E2eError::MissingConfig {
            key: key.to_string(),
            hint: "please set via .env file on root level".to_string(),
        }
    }

    pub fn parse(what: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        E2eError::Parse {
            what: what.into(),
            detail: detail.to_string(),
        }
    }

    /// HTTP status mismatches are transient while a resource converges.
    pub fn is_unexpected_status(&self) -> bool {
        matches!(self, E2eError::UnexpectedStatus { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            E2eError::UnexpectedStatus { actual, .. } => *actual,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_message() {
        let err = E2eError::UnexpectedStatus {
            method: "GET".into(),
            url: "https://app/health".into(),
            expected: 200,
            actual: Some(503),
            body: "down".into(),
        };
        assert_eq!(err.to_string(), "GET https://app/health: expected HTTP 200, got 503: down");
        assert_eq!(err.status(), Some(503));

        let err = E2eError::UnexpectedStatus {
            method: "POST".into(),
            url: "https://ias/oauth2/token".into(),
            expected: 200,
            actual: None,
            body: "bad certificate".into(),
        };
        assert!(err.to_string().contains("got no response"));
    }

    #[test]
    fn test_command_failed_carries_output() {
        let err = E2eError::CommandFailed {
            command: "cf push app".into(),
            exit_code: 1,
            stdout: "Pushing\n".into(),
            stderr: "FAILED".into(),
        };
        let message = err.to_string();
        assert!(message.contains("cf push app"));
        assert!(message.contains("exit code 1"));
        assert!(message.contains("FAILED"));
    }

    #[test]
    fn test_missing_config_names_key() {
        let err = E2eError::missing_config("CFAMSUSER");
        assert!(err.to_string().contains("\"CFAMSUSER\""));
    }
}
