//! Plan construction.

use super::Orchestrator;
use crate::errors::ProvisionError;
use crate::steps::{Step, StepPolicy, StepSpec};
use std::collections::HashSet;

/// Builds an [`Orchestrator`] from an ordered list of steps.
#[derive(Debug)]
pub struct OrchestratorBuilder {
    name: String,
    steps: Vec<StepSpec>,
}

impl OrchestratorBuilder {
    /// Creates a builder for the named plan.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(self, step: impl Step + 'static) -> Self {
        self.boxed_step(Box::new(step))
    }

    /// Appends a boxed step.
    #[must_use]
    pub fn boxed_step(mut self, step: Box<dyn Step>) -> Self {
        self.steps.push(StepSpec::new(step));
        self
    }

    /// Appends a step with an explicit required flag.
    #[must_use]
    pub fn step_with_required(mut self, step: impl Step + 'static, required: bool) -> Self {
        self.steps
            .push(StepSpec::new(Box::new(step)).with_required(required));
        self
    }

    /// Applies configured required/optional overrides by step name.
    #[must_use]
    pub fn apply_policy(mut self, policy: &StepPolicy) -> Self {
        if policy.is_empty() {
            return self;
        }
        self.steps = self
            .steps
            .into_iter()
            .map(|spec| {
                let required = policy.resolve(spec.name(), spec.is_required());
                spec.with_required(required)
            })
            .collect();
        self
    }

    /// Number of steps so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no steps were added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Validates and builds the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if two steps share a name.
    pub fn build(self) -> Result<Orchestrator, ProvisionError> {
        let mut seen = HashSet::new();
        for spec in &self.steps {
            if !seen.insert(spec.name().to_string()) {
                return Err(ProvisionError::step(
                    spec.name(),
                    format!("duplicate step name in plan '{}'", self.name),
                ));
            }
        }
        Ok(Orchestrator {
            name: self.name,
            steps: self.steps,
        })
    }
}
