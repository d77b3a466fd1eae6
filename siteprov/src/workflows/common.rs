//! Steps and rollback handlers shared by several operations.

use crate::context::{DbLogin, RunContext};
use crate::edit::ConfigChange;
use crate::errors::ProvisionError;
use crate::prompt::{with_auth_retry, Prompt};
use crate::steps::{RollbackHandler, Step, StepEffect, StepResult};
use crate::system::{database, services, Database, Dependency};
use async_trait::async_trait;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prompt key for the administrative database password.
pub const ADMIN_PASSWORD_PROMPT: &str = "database.admin_password";

/// Makes sure every tool in a list is installed, offering to install the
/// missing ones.
#[derive(Debug)]
pub struct CheckDependencies {
    dependencies: &'static [Dependency],
}

impl CheckDependencies {
    pub(crate) const fn new(dependencies: &'static [Dependency]) -> Self {
        Self { dependencies }
    }

    fn missing(&self, ctx: &RunContext) -> Vec<Dependency> {
        let runner = ctx.runner();
        self.dependencies
            .iter()
            .filter(|d| !d.is_present(runner.as_ref()))
            .copied()
            .collect()
    }
}

#[async_trait]
impl Step for CheckDependencies {
    fn name(&self) -> &str {
        "check-dependencies"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let missing = self.missing(ctx);
        let Some(first) = missing.first().copied() else {
            return Ok(StepEffect::done()
                .with_note(format!("{} tools present", self.dependencies.len())));
        };

        let manager = ctx.config().packages.manager;
        let packages: Vec<&str> = missing.iter().map(|d| manager.package_for(d)).collect();
        if !ctx.config().packages.auto_install {
            let prompt = Prompt::new(
                "confirm.install-packages",
                format!("Install missing packages with {manager}: {}?", packages.join(" ")),
            );
            match ctx.confirm(&prompt) {
                Ok(()) => {}
                Err(ProvisionError::ConfirmationDenied { .. }) => {
                    return Err(ProvisionError::missing_dependency(
                        first.tool,
                        manager.package_for(&first),
                    ));
                }
                Err(e) => return Err(e),
            }
        }

        info!(manager = %manager, packages = ?packages, "Installing missing packages");
        ctx.run_checked(&ctx.privileged(manager.install_command(&packages)))
            .await?;

        if let Some(still) = self.missing(ctx).first() {
            return Err(ProvisionError::missing_dependency(
                still.tool,
                manager.package_for(still),
            ));
        }
        Ok(StepEffect::done().with_note(format!("installed {}", packages.join(", "))))
    }
}

/// Reports whether one tool is installed. Never installs anything.
#[derive(Debug)]
pub struct ToolPresent {
    name: String,
    dependency: Dependency,
}

impl ToolPresent {
    pub(crate) fn new(dependency: Dependency) -> Self {
        Self {
            name: format!("tool-{}", dependency.tool),
            dependency,
        }
    }
}

#[async_trait]
impl Step for ToolPresent {
    fn name(&self) -> &str {
        &self.name
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let runner = ctx.runner();
        if self.dependency.is_present(runner.as_ref()) {
            Ok(StepEffect::done().with_note(format!("{} found", self.dependency.tool)))
        } else {
            let manager = ctx.config().packages.manager;
            Err(ProvisionError::missing_dependency(
                self.dependency.tool,
                manager.package_for(&self.dependency),
            ))
        }
    }
}

/// Asks for the administrative database password and verifies it against
/// the server, asking again while it is rejected.
#[derive(Debug)]
pub struct DatabaseCredentials;

#[async_trait]
impl Step for DatabaseCredentials {
    fn name(&self) -> &str {
        "database-credentials"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        if let Some(login) = &ctx.credentials().db_admin {
            return Ok(StepEffect::done().with_note(format!("using '{}'", login.user)));
        }
        let user = ctx.config().database.admin_user.clone();
        if ctx.is_dry_run() {
            ctx.credentials_mut().db_admin = Some(DbLogin::new(user, ""));
            return Ok(StepEffect::done().with_note("dry run: password not asked"));
        }

        let prompt = Prompt::new(
            ADMIN_PASSWORD_PROMPT,
            format!("Password for database user '{user}'"),
        );
        let attempts = ctx.config().database.auth_attempts;
        let db = Database::from_config(ctx.config());
        let runner = ctx.runner();
        let prompter = ctx.prompter();

        let login = with_auth_retry(prompter.as_ref(), &prompt, attempts, |secret| {
            let login = DbLogin::new(user.clone(), secret);
            let db = db.clone();
            let runner = Arc::clone(&runner);
            async move { db.verify(runner.as_ref(), &login).await.map(|()| login) }
        })
        .await?;

        let note = format!("authenticated as '{}'", login.user);
        ctx.credentials_mut().db_admin = Some(login);
        Ok(StepEffect::done().with_note(note))
    }
}

/// The verified administrative login.
pub(crate) fn admin_login(ctx: &RunContext, step: &str) -> Result<DbLogin, ProvisionError> {
    ctx.credentials()
        .db_admin
        .clone()
        .ok_or_else(|| ProvisionError::step(step, "database credentials were not collected"))
}

/// Asks before touching something that already exists; a denial becomes a
/// [`ProvisionError::Conflict`] on `target`.
pub(crate) fn confirm_or_conflict(
    ctx: &RunContext,
    prompt: &Prompt,
    target: impl Into<String>,
) -> Result<(), ProvisionError> {
    match ctx.confirm(prompt) {
        Err(ProvisionError::ConfirmationDenied { .. }) => Err(ProvisionError::conflict(target)),
        other => other,
    }
}

/// Drops a site database and its account.
pub(crate) async fn drop_site_database(
    ctx: &RunContext,
    step: &str,
    name: &str,
    user: &str,
) -> Result<(), ProvisionError> {
    let login = admin_login(ctx, step)?;
    let runner = ctx.runner();
    Database::from_config(ctx.config())
        .execute(runner.as_ref(), &login, &database::drop_statements(name, user))
        .await
        .map(drop)
}

/// Drops the database created earlier in the run.
pub(crate) struct DropDatabase {
    label: String,
    name: String,
    user: String,
}

impl DropDatabase {
    pub(crate) fn new(name: impl Into<String>, user: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: format!("drop database {name}"),
            name,
            user: user.into(),
        }
    }
}

#[async_trait]
impl RollbackHandler for DropDatabase {
    fn name(&self) -> &str {
        &self.label
    }

    async fn rollback(&self, ctx: &mut RunContext) -> Result<(), ProvisionError> {
        drop_site_database(ctx, &self.label, &self.name, &self.user).await
    }
}

/// Reloads nginx.
#[derive(Debug)]
pub struct ReloadNginx {
    required: bool,
}

impl ReloadNginx {
    pub(crate) const fn optional() -> Self {
        Self { required: false }
    }
}

#[async_trait]
impl Step for ReloadNginx {
    fn name(&self) -> &str {
        "reload-nginx"
    }

    fn required(&self) -> bool {
        self.required
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let unit = ctx.config().services.nginx.clone();
        services::reload(ctx, &unit).await?;
        Ok(StepEffect::done())
    }
}

/// Deletes a directory tree created earlier in the run.
pub(crate) struct RemoveDir {
    label: String,
    path: PathBuf,
}

impl RemoveDir {
    pub(crate) fn new(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl RollbackHandler for RemoveDir {
    fn name(&self) -> &str {
        &self.label
    }

    async fn rollback(&self, _ctx: &mut RunContext) -> Result<(), ProvisionError> {
        remove_tree(&self.path)?;
        Ok(())
    }
}

/// Restores a configuration file to its content before an edit.
pub(crate) struct RevertConfig {
    label: String,
    change: ConfigChange,
    reload_unit: Option<String>,
}

impl RevertConfig {
    pub(crate) fn new(label: impl Into<String>, change: ConfigChange) -> Self {
        Self {
            label: label.into(),
            change,
            reload_unit: None,
        }
    }

    /// Restarts `unit` after restoring the file.
    pub(crate) fn restarting(mut self, unit: impl Into<String>) -> Self {
        self.reload_unit = Some(unit.into());
        self
    }
}

#[async_trait]
impl RollbackHandler for RevertConfig {
    fn name(&self) -> &str {
        &self.label
    }

    async fn rollback(&self, ctx: &mut RunContext) -> Result<(), ProvisionError> {
        self.change.revert()?;
        if let Some(unit) = &self.reload_unit {
            services::restart(ctx, unit).await?;
        }
        Ok(())
    }
}

/// Removes a directory tree; an absent tree is not an error.
///
/// Returns true if something was removed.
pub(crate) fn remove_tree(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed directory");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
