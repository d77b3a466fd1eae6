//! The operations `siteprov` can run against a site, each an ordered plan
//! of steps.

mod backup;
mod common;
mod inspect;
mod install;
mod remove;

pub use backup::BACKUP_DIR;
pub use common::ADMIN_PASSWORD_PROMPT;
pub use inspect::ALL_DEPENDENCIES;

use crate::config::ProvisionConfig;
use crate::context::RunContext;
use crate::errors::ProvisionError;
use crate::orchestrator::{Orchestrator, RunOutcome};
use std::fmt;

/// One top-level operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Provision a new site.
    Install,
    /// Probe services and site health; never modifies anything.
    Diagnose,
    /// Report which tools are missing.
    Check,
    /// Dump the database and archive the site files.
    Backup,
    /// Restore the named backup, or the latest one.
    Restore(Option<String>),
    /// Delete the site, its database and its server block.
    Remove,
    /// Print paths and backups for the site.
    Info,
}

impl Operation {
    /// Plan name, also used in the run log file name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Diagnose => "diagnose",
            Self::Check => "check",
            Self::Backup => "backup",
            Self::Restore(_) => "restore",
            Self::Remove => "remove",
            Self::Info => "info",
        }
    }

    /// Returns true if the operation never changes the system.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        matches!(self, Self::Diagnose | Self::Check | Self::Info)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Builds the plan for `operation`, applying the configured step policy.
pub fn plan(
    operation: &Operation,
    config: &ProvisionConfig,
) -> Result<Orchestrator, ProvisionError> {
    let builder = Orchestrator::builder(operation.name());
    let builder = match operation {
        Operation::Install => install::steps(builder),
        Operation::Diagnose => inspect::diagnose_steps(builder),
        Operation::Check => inspect::check_steps(builder),
        Operation::Backup => backup::backup_steps(builder),
        Operation::Restore(name) => backup::restore_steps(builder, name.clone()),
        Operation::Remove => remove::steps(builder),
        Operation::Info => inspect::info_steps(builder),
    };
    builder.apply_policy(&config.steps).build()
}

/// Plans and runs `operation`.
pub async fn run(operation: &Operation, ctx: &mut RunContext) -> RunOutcome {
    match plan(operation, ctx.config()) {
        Ok(orchestrator) => orchestrator.execute(ctx).await,
        Err(error) => RunOutcome::failed_to_plan(operation.name(), error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunState;
    use crate::steps::StepPolicy;
    use crate::testing::{test_config, test_context};
    use pretty_assertions::assert_eq;

    fn names(operation: &Operation) -> Vec<String> {
        let config = test_config(std::path::Path::new("/tmp/siteprov"));
        plan(operation, &config)
            .unwrap()
            .step_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_every_operation_has_a_plan() {
        for operation in [
            Operation::Install,
            Operation::Diagnose,
            Operation::Check,
            Operation::Backup,
            Operation::Restore(None),
            Operation::Remove,
            Operation::Info,
        ] {
            assert!(!names(&operation).is_empty(), "{operation} has no steps");
        }
    }

    #[test]
    fn test_restore_plan() {
        assert_eq!(
            names(&Operation::Restore(Some("20260501T093000Z".into()))),
            vec![
                "check-dependencies",
                "select-backup",
                "verify-backup",
                "confirm-restore",
                "database-credentials",
                "import-database",
                "restore-files",
                "discard-previous",
            ]
        );
    }

    #[test]
    fn test_remove_plan() {
        assert_eq!(
            names(&Operation::Remove),
            vec![
                "confirm-remove",
                "database-credentials",
                "drop-database",
                "delete-site-dir",
                "remove-nginx-config",
                "reload-nginx",
            ]
        );
    }

    #[test]
    fn test_policy_applied() {
        let mut config = test_config(std::path::Path::new("/tmp/siteprov"));
        config.steps = StepPolicy {
            required: vec!["install-plugins".into()],
            optional: vec!["tune-php".into()],
        };
        let orchestrator = plan(&Operation::Install, &config).unwrap();
        let required = |name: &str| {
            orchestrator
                .steps()
                .iter()
                .find(|s| s.name() == name)
                .unwrap()
                .is_required()
        };
        assert!(required("install-plugins"));
        assert!(!required("tune-php"));
        assert!(required("create-database"));
    }

    #[test]
    fn test_read_only_operations() {
        assert!(Operation::Diagnose.is_read_only());
        assert!(Operation::Info.is_read_only());
        assert!(!Operation::Restore(None).is_read_only());
        assert_eq!(Operation::Restore(None).to_string(), "restore");
    }

    #[tokio::test]
    async fn test_run_info() {
        let mut ctx = test_context("blog");
        let outcome = run(&Operation::Info, &mut ctx).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.report.state, RunState::Completed);
        assert_eq!(outcome.report.plan, "info");
    }
}
