//! Step trait and implementations.
//!
//! Steps are the units of work a provisioning run is made of. A step that
//! changes the outside world hands back a [`RollbackHandler`] that knows how to
//! undo exactly that change; the orchestrator keeps those handlers and runs
//! them in reverse if a later required step fails.

mod policy;

pub use policy::StepPolicy;

use crate::context::RunContext;
use crate::errors::ProvisionError;
use async_trait::async_trait;
use std::fmt::Debug;

/// Result type returned by step actions.
pub type StepResult = Result<StepEffect, ProvisionError>;

/// Trait for provisioning steps.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Returns the name of the step.
    fn name(&self) -> &str;

    /// Whether a failure of this step aborts the run.
    ///
    /// This is the built-in default; configuration may override it.
    fn required(&self) -> bool {
        true
    }

    /// Whether the step deletes or overwrites state and therefore needs
    /// confirmation before it runs.
    fn destructive(&self) -> bool {
        false
    }

    /// A sentence describing what the step is about to do, used in
    /// confirmation prompts.
    fn describe(&self, ctx: &RunContext) -> String {
        let _ = ctx;
        format!("run '{}'", self.name())
    }

    /// Executes the step.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The run context, shared with every other step of the run
    ///
    /// # Returns
    ///
    /// The effect of the step, optionally carrying a rollback handler.
    async fn execute(&self, ctx: &mut RunContext) -> StepResult;
}

/// Trait for handlers that reverse a step's external effect.
#[async_trait]
pub trait RollbackHandler: Send + Sync {
    /// Returns the name of the handler, used in the run log.
    fn name(&self) -> &str;

    /// Reverses the effect.
    async fn rollback(&self, ctx: &mut RunContext) -> Result<(), ProvisionError>;
}

/// What a successful step leaves behind.
#[derive(Default)]
pub struct StepEffect {
    rollback: Option<Box<dyn RollbackHandler>>,
    note: Option<String>,
}

impl StepEffect {
    /// The step succeeded with nothing to undo.
    #[must_use]
    pub fn done() -> Self {
        Self::default()
    }

    /// The step succeeded and registered an undo action.
    #[must_use]
    pub fn undo_with(handler: impl RollbackHandler + 'static) -> Self {
        Self {
            rollback: Some(Box::new(handler)),
            note: None,
        }
    }

    /// Attaches a human-readable note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Returns the attached note.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    /// Returns true if a rollback handler is attached.
    #[must_use]
    pub fn has_rollback(&self) -> bool {
        self.rollback.is_some()
    }

    /// Splits the effect into its parts.
    #[must_use]
    pub fn into_parts(self) -> (Option<Box<dyn RollbackHandler>>, Option<String>) {
        (self.rollback, self.note)
    }
}

impl std::fmt::Debug for StepEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepEffect")
            .field("rollback", &self.rollback.as_ref().map(|h| h.name().to_string()))
            .field("note", &self.note)
            .finish()
    }
}

/// A simple function-based step.
pub struct FnStep<F>
where
    F: Fn(&mut RunContext) -> StepResult + Send + Sync,
{
    name: String,
    required: bool,
    destructive: bool,
    func: F,
}

impl<F> FnStep<F>
where
    F: Fn(&mut RunContext) -> StepResult + Send + Sync,
{
    /// Creates a new required, non-destructive function-based step.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            required: true,
            destructive: false,
            func,
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
}

impl<F> Debug for FnStep<F>
where
    F: Fn(&mut RunContext) -> StepResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("destructive", &self.destructive)
            .finish()
    }
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&mut RunContext) -> StepResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        self.required
    }

    fn destructive(&self) -> bool {
        self.destructive
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        (self.func)(ctx)
    }
}

/// A function-based rollback handler.
pub struct FnRollback<F>
where
    F: Fn(&mut RunContext) -> Result<(), ProvisionError> + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnRollback<F>
where
    F: Fn(&mut RunContext) -> Result<(), ProvisionError> + Send + Sync,
{
    /// Creates a new function-based rollback handler.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> RollbackHandler for FnRollback<F>
where
    F: Fn(&mut RunContext) -> Result<(), ProvisionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn rollback(&self, ctx: &mut RunContext) -> Result<(), ProvisionError> {
        (self.func)(ctx)
    }
}

/// A step together with the required flag resolved for this run.
#[derive(Debug)]
pub struct StepSpec {
    step: Box<dyn Step>,
    required: bool,
}

impl StepSpec {
    /// Wraps a step using its built-in required flag.
    #[must_use]
    pub fn new(step: Box<dyn Step>) -> Self {
        let required = step.required();
        Self { step, required }
    }

    /// Overrides the required flag.
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// The wrapped step.
    #[must_use]
    pub fn step(&self) -> &dyn Step {
        self.step.as_ref()
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.step.name()
    }

    /// The resolved required flag.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }
}
