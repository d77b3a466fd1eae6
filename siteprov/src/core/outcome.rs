//! Step and rollback outcomes, and the summary of a whole run.

use super::{RunState, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Step name.
    pub name: String,
    /// Whether the step was required for this run.
    pub required: bool,
    /// Outcome status.
    pub status: StepStatus,
    /// Human-readable note produced by the step (diagnose findings, etc).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Error message if the step failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the step started.
    pub started_at: DateTime<Utc>,
    /// When the step ended.
    pub ended_at: DateTime<Utc>,
}

impl StepOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn ok(
        name: impl Into<String>,
        required: bool,
        started_at: DateTime<Utc>,
        note: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            required,
            status: StepStatus::Ok,
            note,
            error: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a failed outcome; optional steps are recorded as warnings.
    #[must_use]
    pub fn failed(
        name: impl Into<String>,
        required: bool,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            required,
            status: if required {
                StepStatus::Failed
            } else {
                StepStatus::Warned
            },
            note: None,
            error: Some(error.into()),
            started_at,
            ended_at: Utc::now(),
        }
    }
}

/// What happened to one rollback handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackOutcome {
    /// Handler name.
    pub name: String,
    /// Error message if the handler failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RollbackOutcome {
    /// Returns true if the handler succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of an orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Name of the plan that ran (e.g. `install`).
    pub plan: String,
    /// Final state.
    pub state: RunState,
    /// One entry per step that ran, in order.
    pub steps: Vec<StepOutcome>,
    /// One entry per rollback handler that ran, in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rollbacks: Vec<RollbackOutcome>,
    /// Path of the run log, when one was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<std::path::PathBuf>,
}

impl RunReport {
    /// Creates an empty report for the named plan.
    #[must_use]
    pub fn new(plan: impl Into<String>) -> Self {
        Self {
            plan: plan.into(),
            state: RunState::NotStarted,
            steps: Vec::new(),
            rollbacks: Vec::new(),
            log_path: None,
        }
    }

    /// Optional steps that failed.
    pub fn warnings(&self) -> impl Iterator<Item = &StepOutcome> {
        self.steps.iter().filter(|s| s.status == StepStatus::Warned)
    }

    /// Notes produced by steps, paired with the step name.
    pub fn notes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.steps
            .iter()
            .filter_map(|s| s.note.as_deref().map(|n| (s.name.as_str(), n)))
    }

    /// Returns true if the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Rollback handlers that failed.
    pub fn rollback_failures(&self) -> impl Iterator<Item = &RollbackOutcome> {
        self.rollbacks.iter().filter(|r| !r.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_optional_step_is_warning() {
        let outcome = StepOutcome::failed("plugins", false, Utc::now(), "boom");
        assert_eq!(outcome.status, StepStatus::Warned);

        let outcome = StepOutcome::failed("database", true, Utc::now(), "boom");
        assert_eq!(outcome.status, StepStatus::Failed);
    }

    #[test]
    fn test_report_warnings_and_notes() {
        let mut report = RunReport::new("diagnose");
        report.steps.push(StepOutcome::ok("nginx", false, Utc::now(), Some("active".into())));
        report.steps.push(StepOutcome::failed("php-fpm", false, Utc::now(), "inactive"));

        assert_eq!(report.warnings().count(), 1);
        let notes: Vec<_> = report.notes().collect();
        assert_eq!(notes, vec![("nginx", "active")]);
    }

    #[test]
    fn test_report_serialization_skips_empty() {
        let report = RunReport::new("check");
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("rollbacks").is_none());
        assert_eq!(json["state"], "not_started");
    }
}
