//! Core domain model types for siteprov.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Run and step status enums
//! - Step and rollback outcomes, and the run report

mod outcome;
mod status;

pub use outcome::{RollbackOutcome, RunReport, StepOutcome};
pub use status::{RunState, StepStatus};
