//! Testing utilities for siteprov runs.
//!
//! This module provides:
//! - Mock steps that succeed, fail or record what ran
//! - A scripted command runner that answers by substring match
//! - Contexts rooted in scratch directories

mod fixtures;
mod mocks;
mod runner;

pub use crate::prompt::ScriptedPrompter;
pub use fixtures::{context_at, scratch_root, test_config, test_context};
pub use mocks::{journal, FailingStep, Journal, RecordingStep, SuccessStep};
pub use runner::ScriptedRunner;
