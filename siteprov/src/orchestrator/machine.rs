//! Guarded run state transitions.

use crate::core::RunState;
use crate::errors::ProvisionError;
use tracing::debug;

/// Tracks the state of one run and rejects illegal transitions.
#[derive(Debug, Default)]
pub struct RunStateMachine {
    state: RunState,
    history: Vec<RunState>,
}

impl RunStateMachine {
    /// Creates a machine in [`RunState::NotStarted`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// States left so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// Moves to `next`.
    pub fn transition(&mut self, next: RunState) -> Result<RunState, ProvisionError> {
        if !self.state.can_transition_to(next) {
            return Err(ProvisionError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "Run state transition");
        self.history.push(self.state);
        self.state = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_happy_path() {
        let mut machine = RunStateMachine::new();
        machine.transition(RunState::Running).unwrap();
        machine.transition(RunState::Completed).unwrap();
        assert_eq!(machine.state(), RunState::Completed);
        assert_eq!(machine.history(), &[RunState::NotStarted, RunState::Running]);
    }

    #[test]
    fn test_rollback_path() {
        let mut machine = RunStateMachine::new();
        for next in [
            RunState::Running,
            RunState::Failed,
            RunState::RollingBack,
            RunState::RolledBack,
        ] {
            machine.transition(next).unwrap();
        }
        assert!(machine.state().is_terminal());
    }

    #[test]
    fn test_illegal_transitions() {
        let mut machine = RunStateMachine::new();
        let err = machine.transition(RunState::Completed).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::InvalidState {
                from: RunState::NotStarted,
                to: RunState::Completed
            }
        ));
        assert_eq!(machine.state(), RunState::NotStarted);

        machine.transition(RunState::Running).unwrap();
        machine.transition(RunState::Completed).unwrap();
        assert!(machine.transition(RunState::Running).is_err());
        assert!(machine.transition(RunState::RollingBack).is_err());
    }
}
