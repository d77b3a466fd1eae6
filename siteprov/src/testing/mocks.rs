//! Mock steps for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::context::RunContext;
use crate::errors::ProvisionError;
use crate::steps::{RollbackHandler, Step, StepEffect, StepResult};

/// Shared, ordered record of what ran: `run:<step>` and `rollback:<step>`.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// Creates an empty journal.
#[must_use]
pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

/// A step that always succeeds without side effects.
#[derive(Debug)]
pub struct SuccessStep {
    name: String,
    required: bool,
    destructive: bool,
    note: Option<String>,
}

impl SuccessStep {
    /// Creates a required, non-destructive success step.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            destructive: false,
            note: None,
        }
    }

    /// Marks the step as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Marks the step as destructive.
    #[must_use]
    pub fn mark_destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    /// Attaches a note to the effect.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[async_trait]
impl Step for SuccessStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    fn destructive(&self) -> bool {
        self.destructive
    }

    async fn execute(&self, _ctx: &mut RunContext) -> StepResult {
        Ok(match &self.note {
            Some(note) => StepEffect::done().with_note(note.clone()),
            None => StepEffect::done(),
        })
    }
}

/// A step that always fails.
#[derive(Debug)]
pub struct FailingStep {
    name: String,
    error: String,
    required: bool,
}

impl FailingStep {
    /// Creates a required failing step.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            required: true,
        }
    }

    /// Marks the step as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[async_trait]
impl Step for FailingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn execute(&self, _ctx: &mut RunContext) -> StepResult {
        Err(ProvisionError::step(&self.name, &self.error))
    }
}

/// A step that writes to a [`Journal`] when it runs and when it is rolled
/// back.
#[derive(Debug)]
pub struct RecordingStep {
    name: String,
    journal: Journal,
    required: bool,
}

impl RecordingStep {
    /// Creates a required recording step.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: Arc::clone(journal),
            required: true,
        }
    }

    /// Marks the step as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }
}

#[async_trait]
impl Step for RecordingStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn execute(&self, _ctx: &mut RunContext) -> StepResult {
        self.journal.lock().push(format!("run:{}", self.name));
        Ok(StepEffect::undo_with(JournalRollback {
            name: self.name.clone(),
            journal: Arc::clone(&self.journal),
        }))
    }
}

struct JournalRollback {
    name: String,
    journal: Journal,
}

#[async_trait]
impl RollbackHandler for JournalRollback {
    fn name(&self) -> &str {
        &self.name
    }

    async fn rollback(&self, _ctx: &mut RunContext) -> Result<(), ProvisionError> {
        self.journal.lock().push(format!("rollback:{}", self.name));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;

    #[tokio::test]
    async fn test_success_step() {
        let step = SuccessStep::new("ok").optional().with_note("fine");
        assert!(!step.required());
        assert!(!step.destructive());
        assert!(SuccessStep::new("wipe").mark_destructive().destructive());
        let mut ctx = test_context("blog");
        let effect = step.execute(&mut ctx).await.unwrap();
        assert_eq!(effect.note(), Some("fine"));
    }

    #[tokio::test]
    async fn test_failing_step() {
        let step = FailingStep::new("bad", "boom");
        let mut ctx = test_context("blog");
        let err = step.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "Step 'bad' failed: boom");
    }

    #[tokio::test]
    async fn test_recording_step_and_rollback() {
        let log = journal();
        let step = RecordingStep::new("dir", &log);
        let mut ctx = test_context("blog");

        let (handler, _) = step.execute(&mut ctx).await.unwrap().into_parts();
        handler.unwrap().rollback(&mut ctx).await.unwrap();

        assert_eq!(*log.lock(), vec!["run:dir", "rollback:dir"]);
    }
}
