//! Run and step status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of one orchestration run.
///
/// ```text
/// NotStarted -> Running -> Completed
///                       -> Failed -> RollingBack -> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Nothing has run yet.
    #[default]
    NotStarted,
    /// Steps are executing.
    Running,
    /// All steps ran; optional failures may have been recorded.
    Completed,
    /// A required step failed or the run was interrupted.
    Failed,
    /// Rollback handlers are executing.
    RollingBack,
    /// Rollback finished (successfully or not).
    RolledBack,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::RollingBack => write!(f, "rolling_back"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

impl RunState {
    /// Returns true if the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack)
    }

    /// Returns true if `next` is a legal successor of `self`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Running)
                | (Self::Running, Self::Completed | Self::Failed)
                | (Self::Failed, Self::RollingBack)
                | (Self::RollingBack, Self::RolledBack)
        )
    }
}

/// The outcome status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step completed successfully.
    Ok,
    /// An optional step failed; the run continued.
    Warned,
    /// A required step failed; the run stopped.
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Warned => write!(f, "warned"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StepStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}
