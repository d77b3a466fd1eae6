//! Site removal.
//!
//! No step registers a rollback. Every step that deletes something asks
//! first.

use super::common::{drop_site_database, remove_tree, DatabaseCredentials, ReloadNginx};
use crate::backup::ConfigSnapshots;
use crate::context::RunContext;
use crate::orchestrator::OrchestratorBuilder;
use crate::steps::{Step, StepEffect, StepResult};
use crate::system::nginx;
use async_trait::async_trait;
use std::fs;
use std::io;

pub(crate) fn steps(builder: OrchestratorBuilder) -> OrchestratorBuilder {
    builder
        .step(ConfirmRemove)
        .step(DatabaseCredentials)
        .step(DropSiteDatabase)
        .step(DeleteSiteDir)
        .step(RemoveNginxConfig)
        .step(ReloadNginx::optional())
}

#[derive(Debug)]
struct ConfirmRemove;

#[async_trait]
impl Step for ConfirmRemove {
    fn name(&self) -> &str {
        "confirm-remove"
    }

    fn destructive(&self) -> bool {
        true
    }

    fn describe(&self, ctx: &RunContext) -> String {
        format!("remove site '{}' and all of its data", ctx.site())
    }

    async fn execute(&self, _ctx: &mut RunContext) -> StepResult {
        Ok(StepEffect::done())
    }
}

#[derive(Debug)]
struct DropSiteDatabase;

#[async_trait]
impl Step for DropSiteDatabase {
    fn name(&self) -> &str {
        "drop-database"
    }

    fn destructive(&self) -> bool {
        true
    }

    fn describe(&self, ctx: &RunContext) -> String {
        format!("drop database '{}' and its user", ctx.site().db_name())
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let name = ctx.site().db_name();
        drop_site_database(ctx, self.name(), &name, &name).await?;
        Ok(StepEffect::done().with_note(format!("dropped database '{name}'")))
    }
}

#[derive(Debug)]
struct DeleteSiteDir;

#[async_trait]
impl Step for DeleteSiteDir {
    fn name(&self) -> &str {
        "delete-site-dir"
    }

    fn destructive(&self) -> bool {
        true
    }

    fn describe(&self, ctx: &RunContext) -> String {
        format!("delete {}", ctx.paths().site_dir.display())
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let dir = ctx.paths().site_dir.clone();
        if ctx.is_dry_run() {
            return Ok(StepEffect::done().with_note(format!("would delete {}", dir.display())));
        }
        let note = if remove_tree(&dir)? {
            format!("deleted {}", dir.display())
        } else {
            format!("{} was already gone", dir.display())
        };
        Ok(StepEffect::done().with_note(note))
    }
}

/// Unlinks the server block and deletes it, keeping a snapshot.
#[derive(Debug)]
struct RemoveNginxConfig;

#[async_trait]
impl Step for RemoveNginxConfig {
    fn name(&self) -> &str {
        "remove-nginx-config"
    }

    fn destructive(&self) -> bool {
        true
    }

    fn describe(&self, ctx: &RunContext) -> String {
        format!("remove {}", ctx.paths().nginx_available.display())
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let available = ctx.paths().nginx_available.clone();
        let enabled = ctx.paths().nginx_enabled.clone();
        if ctx.is_dry_run() {
            return Ok(StepEffect::done()
                .with_note(format!("would remove {}", available.display())));
        }

        ConfigSnapshots::new(&ctx.paths().snapshot_dir, ctx.config().backups.retention)
            .snapshot_file(&available)?;
        nginx::disable(&enabled)?;
        match fs::remove_file(&available) {
            Ok(()) => Ok(StepEffect::done()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Ok(StepEffect::done().with_note("no server block to remove"))
            }
            Err(e) => Err(e.into()),
        }
    }
}
