//! Error types for siteprov.
//!
//! Every failure a run can hit is one of a small number of kinds: a missing
//! external tool, a rejected credential, a wrapped command exiting non-zero,
//! or a target that already exists. Each kind maps to a process exit code.

use crate::core::RunState;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required external tool is not installed.
    #[error("Missing dependency: '{tool}' not found (install package '{package}')")]
    MissingDependency {
        /// The executable that was looked up.
        tool: String,
        /// The package that provides it.
        package: String,
    },

    /// A credential was rejected.
    #[error("Authentication failed for '{principal}': {reason}")]
    Authentication {
        /// Who tried to authenticate.
        principal: String,
        /// What the server said.
        reason: String,
    },

    /// A wrapped command exited unsuccessfully.
    #[error("Command `{command}` failed: {reason}")]
    CommandFailed {
        /// The rendered command line (no secrets).
        command: String,
        /// Exit code, if the process exited normally.
        exit_code: Option<i32>,
        /// Short description of the failure.
        reason: String,
        /// Captured stdout and stderr.
        output: String,
    },

    /// The target of a create operation already exists.
    #[error("{target} already exists")]
    Conflict {
        /// What already exists.
        target: String,
    },

    /// The operator declined a confirmation prompt.
    #[error("Confirmation denied: {action}")]
    ConfirmationDenied {
        /// The action that was declined.
        action: String,
    },

    /// The run was interrupted by the operator.
    #[error("Run interrupted: {0}")]
    Interrupted(String),

    /// A configuration problem.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Invalid command-line usage.
    #[error("Usage error: {0}")]
    Usage(String),

    /// The run state machine was driven through an illegal transition.
    #[error("Invalid run state transition: {from} -> {to}")]
    InvalidState {
        /// Current state.
        from: RunState,
        /// Requested state.
        to: RunState,
    },

    /// A step failed for a reason not covered by the other kinds.
    #[error("Step '{step}' failed: {message}")]
    Step {
        /// The step name.
        step: String,
        /// What went wrong.
        message: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Coarse classification of a [`ProvisionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required tool or package is absent.
    MissingDependency,
    /// A credential was rejected.
    Authentication,
    /// An external command failed.
    ExternalCommand,
    /// Target already exists or the operator refused to touch it.
    Conflict,
    /// The operator interrupted the run.
    Interrupted,
    /// Bad arguments or configuration.
    Usage,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Process exit code for this kind.
    ///
    /// | kind | code |
    /// |------|------|
    /// | internal | 1 |
    /// | usage | 2 |
    /// | missing dependency | 3 |
    /// | authentication | 4 |
    /// | external command | 5 |
    /// | conflict | 6 |
    /// | interrupted | 130 |
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Internal => 1,
            Self::Usage => 2,
            Self::MissingDependency => 3,
            Self::Authentication => 4,
            Self::ExternalCommand => 5,
            Self::Conflict => 6,
            Self::Interrupted => 130,
        }
    }
}

impl ProvisionError {
    /// Creates a missing dependency error.
    #[must_use]
    pub fn missing_dependency(tool: impl Into<String>, package: impl Into<String>) -> Self {
        Self::MissingDependency {
            tool: tool.into(),
            package: package.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(principal: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            principal: principal.into(),
            reason: reason.into(),
        }
    }

    /// Creates a command failure from the exit code and captured output.
    #[must_use]
    pub fn command_failed(
        command: impl Into<String>,
        exit_code: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        let reason = exit_code.map_or_else(
            || "terminated by signal".to_string(),
            |code| format!("exit code {code}"),
        );
        Self::CommandFailed {
            command: command.into(),
            exit_code,
            reason,
            output: output.into(),
        }
    }

    /// Creates a command failure for a process that could not be started.
    #[must_use]
    pub fn spawn_failed(command: impl Into<String>, err: &std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            exit_code: None,
            reason: format!("could not start: {err}"),
            output: String::new(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(target: impl Into<String>) -> Self {
        Self::Conflict {
            target: target.into(),
        }
    }

    /// Creates a confirmation denied error.
    #[must_use]
    pub fn confirmation_denied(action: impl Into<String>) -> Self {
        Self::ConfirmationDenied {
            action: action.into(),
        }
    }

    /// Creates a generic step error.
    #[must_use]
    pub fn step(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Step {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingDependency { .. } => ErrorKind::MissingDependency,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::CommandFailed { .. } => ErrorKind::ExternalCommand,
            Self::Conflict { .. } | Self::ConfirmationDenied { .. } => ErrorKind::Conflict,
            Self::Interrupted(_) => ErrorKind::Interrupted,
            Self::Config(_) | Self::Usage(_) => ErrorKind::Usage,
            Self::InvalidState { .. }
            | Self::Step { .. }
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Process exit code for the error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }

    /// Returns the captured command output, if any.
    #[must_use]
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::json!(self.kind()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Self::CommandFailed { exit_code, .. } = self {
            map.insert("exit_code".to_string(), serde_json::json!(exit_code));
        }
        map
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or does not match the schema.
    #[error("Failed to parse config file {}: {reason}", .path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A value is out of range.
    #[error("Invalid configuration value for '{key}': {reason}")]
    Invalid {
        /// The offending key.
        key: String,
        /// Why it is rejected.
        reason: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_kind() {
        assert_eq!(ProvisionError::missing_dependency("wp", "wp-cli").exit_code(), 3);
        assert_eq!(ProvisionError::authentication("root", "denied").exit_code(), 4);
        assert_eq!(ProvisionError::command_failed("nginx -t", Some(1), "").exit_code(), 5);
        assert_eq!(ProvisionError::conflict("/srv/http/blog").exit_code(), 6);
        assert_eq!(ProvisionError::confirmation_denied("drop database").exit_code(), 6);
        assert_eq!(ProvisionError::Interrupted("ctrl-c".into()).exit_code(), 130);
        assert_eq!(ProvisionError::Usage("no site".into()).exit_code(), 2);
        assert_eq!(ProvisionError::step("x", "y").exit_code(), 1);
    }

    #[test]
    fn test_command_failed_message() {
        let err = ProvisionError::command_failed("nginx -t", Some(1), "syntax error");
        assert_eq!(err.to_string(), "Command `nginx -t` failed: exit code 1");
        assert_eq!(err.command_output(), Some("syntax error"));

        let err = ProvisionError::command_failed("wp core download", None, "");
        assert!(err.to_string().contains("terminated by signal"));
        assert!(err.command_output().is_none());
    }

    #[test]
    fn test_config_error_is_usage() {
        let err: ProvisionError = ConfigError::invalid("backups.retention", "must be > 0").into();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert!(err.to_string().contains("backups.retention"));
    }

    #[test]
    fn test_to_dict() {
        let dict = ProvisionError::command_failed("tar", Some(2), "").to_dict();
        assert_eq!(dict.get("kind").unwrap(), "external_command");
        assert_eq!(dict.get("exit_code").unwrap(), 2);
    }
}
