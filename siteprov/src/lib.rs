//! # siteprov
//!
//! Provisioning of WordPress sites on a single host running nginx, PHP-FPM
//! and MariaDB, expressed as ordered plans of steps.
//!
//! - **Sequenced steps**: every operation is a fixed list of required and
//!   optional steps run one after another
//! - **Rollback**: when a required step fails, the undo actions of the
//!   steps that already succeeded run newest first
//! - **Run log**: an append-only, timestamped record of every step
//! - **Confirmation**: destructive steps ask before they act
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use siteprov::prelude::*;
//!
//! let config = ProvisionConfig::load(None)?;
//! let site = SiteName::new("blog")?;
//! let mut ctx = RunContext::new(site, Arc::new(config));
//!
//! let outcome = workflows::run(&Operation::Install, &mut ctx).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backup;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod edit;
pub mod errors;
pub mod events;
pub mod observability;
pub mod orchestrator;
pub mod prompt;
pub mod runlog;
pub mod steps;
pub mod system;
pub mod testing;
pub mod utils;
pub mod workflows;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::{CancellationToken, RollbackRegistry};
    pub use crate::config::ProvisionConfig;
    pub use crate::context::{Credentials, DbLogin, RunContext, RunOptions, SiteName, SitePaths};
    pub use crate::core::{RollbackOutcome, RunReport, RunState, StepOutcome, StepStatus};
    pub use crate::errors::{ConfigError, ErrorKind, ProvisionError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::orchestrator::{Orchestrator, OrchestratorBuilder, RunOutcome};
    pub use crate::prompt::{AutoConfirmPrompter, Prompt, Prompter, ScriptedPrompter};
    pub use crate::runlog::{LogLevel, RunLog};
    pub use crate::steps::{RollbackHandler, Step, StepEffect, StepResult};
    pub use crate::system::{CommandRunner, CommandSpec, RecordingRunner, SystemCommandRunner};
    pub use crate::workflows::Operation;
    pub use std::sync::Arc;
}
