//! Sequential step execution with LIFO rollback.
//!
//! The orchestrator runs its steps strictly in declaration order, one at a
//! time. Every outcome is appended to the run log:
//!
//! ```text
//! step create-site-dir: ok
//! step create-database: failed: Command `mariadb ...` failed: exit code 1 | ...
//! rollback remove site directory: ok
//! run rolled back after 'create-database' failed: ...
//! ```
//!
//! An optional step that fails is logged as a warning and the run goes on.
//! A required step that fails stops the run; the rollback handlers collected
//! from the steps that succeeded so far are then run newest first, exactly
//! once each, and the original error is returned.

mod builder;
mod machine;

pub use builder::OrchestratorBuilder;
pub use machine::RunStateMachine;

use crate::cancellation::RollbackRegistry;
use crate::context::RunContext;
use crate::core::{RunReport, RunState, StepOutcome};
use crate::errors::ProvisionError;
use crate::prompt::Prompt;
use crate::runlog::LogLevel;
use crate::steps::{StepEffect, StepSpec};
use crate::utils::now_utc;
use serde_json::json;
use tracing::{debug, info};

/// Report and error of a finished run.
#[derive(Debug)]
pub struct RunOutcome {
    /// What happened, step by step.
    pub report: RunReport,
    /// The error that stopped the run, if any.
    pub error: Option<ProvisionError>,
}

impl RunOutcome {
    /// An outcome for a plan that could not be built; no step ran.
    #[must_use]
    pub fn failed_to_plan(plan: impl Into<String>, error: ProvisionError) -> Self {
        Self {
            report: RunReport::new(plan),
            error: Some(error),
        }
    }

    /// Converts into a `Result`, dropping the report on failure.
    pub fn into_result(self) -> Result<RunReport, ProvisionError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.report),
        }
    }
}

/// Runs a fixed, ordered plan of steps.
#[derive(Debug)]
pub struct Orchestrator {
    name: String,
    steps: Vec<StepSpec>,
}

impl Orchestrator {
    /// Starts building a plan.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(name)
    }

    /// The plan name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[StepSpec] {
        &self.steps
    }

    /// Step names in execution order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(StepSpec::name).collect()
    }

    /// Runs the plan.
    ///
    /// # Errors
    ///
    /// Returns the error of the first required step that failed (after
    /// rollback), or [`ProvisionError::Interrupted`] if the run was
    /// cancelled between steps.
    pub async fn run(&self, ctx: &mut RunContext) -> Result<RunReport, ProvisionError> {
        self.execute(ctx).await.into_result()
    }

    /// Runs the plan and returns the report whether or not it succeeded.
    pub async fn execute(&self, ctx: &mut RunContext) -> RunOutcome {
        let mut report = RunReport::new(&self.name);
        report.log_path = ctx.log().path().map(std::path::Path::to_path_buf);
        let error = self.drive(ctx, &mut report).await.err();
        RunOutcome { report, error }
    }

    async fn drive(
        &self,
        ctx: &mut RunContext,
        report: &mut RunReport,
    ) -> Result<(), ProvisionError> {
        let mut machine = RunStateMachine::new();
        let mut registry = RollbackRegistry::new();

        report.state = machine.transition(RunState::Running)?;
        info!(
            plan = %self.name,
            site = %ctx.site(),
            run_id = %ctx.identity().run_id,
            steps = self.steps.len(),
            "Run started"
        );
        ctx.events().emit(
            "run.started",
            Some(json!({
                "plan": &self.name,
                "site": ctx.site().as_str(),
                "run_id": ctx.identity().run_id.to_string(),
                "steps": self.step_names(),
            })),
        );

        let mut failure: Option<(String, ProvisionError)> = None;

        for spec in &self.steps {
            let name = spec.name();

            if let Err(interrupted) = ctx.cancel_token().check() {
                ctx.record(
                    LogLevel::Error,
                    format!("run interrupted before step {name}"),
                );
                failure = Some((name.to_string(), interrupted));
                break;
            }

            let started_at = now_utc();
            debug!(step = %name, required = spec.is_required(), "Step started");
            match Self::run_step(spec, ctx).await {
                Ok(effect) => {
                    let (rollback, note) = effect.into_parts();
                    if let Some(handler) = rollback {
                        registry.register(handler);
                    }
                    ctx.record(LogLevel::Ok, format!("step {name}: ok"));
                    ctx.events().emit(
                        "step.completed",
                        Some(json!({ "step": name, "note": &note })),
                    );
                    report
                        .steps
                        .push(StepOutcome::ok(name, spec.is_required(), started_at, note));
                }
                Err(error) => {
                    let level = if spec.is_required() {
                        LogLevel::Error
                    } else {
                        LogLevel::Warn
                    };
                    ctx.record(level, failure_message(name, spec.is_required(), &error));
                    ctx.events().emit(
                        "step.failed",
                        Some(json!({
                            "step": name,
                            "required": spec.is_required(),
                            "error": error.to_dict(),
                        })),
                    );
                    report.steps.push(StepOutcome::failed(
                        name,
                        spec.is_required(),
                        started_at,
                        error.to_string(),
                    ));
                    if spec.is_required() {
                        failure = Some((name.to_string(), error));
                        break;
                    }
                }
            }
        }

        let Some((failed_step, error)) = failure else {
            report.state = machine.transition(RunState::Completed)?;
            let warnings = report.warnings().count();
            ctx.record(
                LogLevel::Ok,
                format!(
                    "run completed: {} steps, {warnings} warnings",
                    report.steps.len()
                ),
            );
            ctx.events().emit(
                "run.completed",
                Some(json!({ "plan": &self.name, "warnings": warnings })),
            );
            info!(plan = %self.name, warnings, "Run completed");
            return Ok(());
        };

        report.state = machine.transition(RunState::Failed)?;
        report.state = machine.transition(RunState::RollingBack)?;
        info!(
            plan = %self.name,
            failed_step = %failed_step,
            handlers = registry.pending_count(),
            "Rolling back"
        );

        let rollbacks = registry.run_all(ctx).await;
        for outcome in &rollbacks {
            match &outcome.error {
                None => {
                    ctx.record(LogLevel::Ok, format!("rollback {}: ok", outcome.name));
                    ctx.events()
                        .emit("rollback.completed", Some(json!({ "handler": &outcome.name })));
                }
                Some(e) => {
                    ctx.record(
                        LogLevel::Error,
                        format!("rollback {}: failed: {e}", outcome.name),
                    );
                    ctx.events().emit(
                        "rollback.failed",
                        Some(json!({ "handler": &outcome.name, "error": e })),
                    );
                }
            }
        }
        report.rollbacks = rollbacks;

        report.state = machine.transition(RunState::RolledBack)?;
        ctx.record(
            LogLevel::Error,
            format!("run rolled back after '{failed_step}' failed: {error}"),
        );
        ctx.events().emit(
            "run.rolled_back",
            Some(json!({
                "plan": &self.name,
                "failed_step": &failed_step,
                "error": error.to_dict(),
            })),
        );
        Err(error)
    }

    async fn run_step(spec: &StepSpec, ctx: &mut RunContext) -> Result<StepEffect, ProvisionError> {
        let step = spec.step();
        if step.destructive() {
            let prompt = Prompt::new(
                format!("confirm.{}", step.name()),
                format!("About to {}. Continue?", step.describe(ctx)),
            );
            ctx.confirm(&prompt)?;
        }
        step.execute(ctx).await
    }
}

fn failure_message(name: &str, required: bool, error: &ProvisionError) -> String {
    let kind = if required { "failed" } else { "failed (optional)" };
    match error.command_output() {
        Some(output) => format!("step {name}: {kind}: {error}\n{output}"),
        None => format!("step {name}: {kind}: {error}"),
    }
}
