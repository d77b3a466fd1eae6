//! Read-only operations: diagnose, check and info.
//!
//! Every step here is optional. A failed probe is a warning in the run log
//! and the next probe still runs, so one run reports every problem.

use super::common::ToolPresent;
use crate::backup::SiteBackups;
use crate::context::{DbLogin, RunContext};
use crate::errors::ProvisionError;
use crate::orchestrator::OrchestratorBuilder;
use crate::steps::{Step, StepEffect, StepResult};
use crate::system::packages::{
    MARIADB, MARIADB_DUMP, NGINX, PHP, PHP_FPM, SYSTEMCTL, TAR, WP_CLI,
};
use crate::system::{nginx, services, Database, Dependency, WpCli};
use async_trait::async_trait;
use std::fmt::Write as _;

/// Every tool any operation uses.
pub const ALL_DEPENDENCIES: &[Dependency] =
    &[NGINX, PHP, PHP_FPM, MARIADB, MARIADB_DUMP, WP_CLI, TAR, SYSTEMCTL];

fn tools(mut builder: OrchestratorBuilder) -> OrchestratorBuilder {
    for dependency in ALL_DEPENDENCIES {
        builder = builder.step(ToolPresent::new(*dependency));
    }
    builder
}

pub(crate) fn check_steps(builder: OrchestratorBuilder) -> OrchestratorBuilder {
    tools(builder)
}

pub(crate) fn diagnose_steps(builder: OrchestratorBuilder) -> OrchestratorBuilder {
    tools(builder)
        .step(ServiceActive::nginx())
        .step(ServiceActive::php_fpm())
        .step(ServiceActive::database())
        .step(NginxConfigTest)
        .step(DatabaseConnectivity)
        .step(SiteDirectory)
        .step(WordPressInstalled)
        .step(SiteEnabled)
}

pub(crate) fn info_steps(builder: OrchestratorBuilder) -> OrchestratorBuilder {
    builder.step(SiteSummary).step(ListBackups)
}

fn probe_failed(step: &str, message: impl Into<String>) -> ProvisionError {
    ProvisionError::step(step, message)
}

#[derive(Debug, Clone, Copy)]
enum Unit {
    Nginx,
    PhpFpm,
    Database,
}

#[derive(Debug)]
struct ServiceActive {
    name: &'static str,
    unit: Unit,
}

impl ServiceActive {
    const fn nginx() -> Self {
        Self {
            name: "service-nginx",
            unit: Unit::Nginx,
        }
    }

    const fn php_fpm() -> Self {
        Self {
            name: "service-php-fpm",
            unit: Unit::PhpFpm,
        }
    }

    const fn database() -> Self {
        Self {
            name: "service-database",
            unit: Unit::Database,
        }
    }
}

#[async_trait]
impl Step for ServiceActive {
    fn name(&self) -> &str {
        self.name
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let names = &ctx.config().services;
        let unit = match self.unit {
            Unit::Nginx => names.nginx.clone(),
            Unit::PhpFpm => names.php_fpm.clone(),
            Unit::Database => names.database.clone(),
        };
        if services::is_active(ctx, &unit).await? {
            Ok(StepEffect::done().with_note(format!("{unit} is active")))
        } else {
            Err(probe_failed(self.name, format!("{unit} is not active")))
        }
    }
}

#[derive(Debug)]
struct NginxConfigTest;

#[async_trait]
impl Step for NginxConfigTest {
    fn name(&self) -> &str {
        "nginx-config-test"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        ctx.run_checked(&ctx.privileged(nginx::test_config())).await?;
        Ok(StepEffect::done().with_note("configuration is valid"))
    }
}

/// Logs in with the account stored in `wp-config.php`.
#[derive(Debug)]
struct DatabaseConnectivity;

#[async_trait]
impl Step for DatabaseConnectivity {
    fn name(&self) -> &str {
        "database-connectivity"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        if !ctx.paths().wp_config.is_file() {
            return Err(probe_failed(self.name(), "no wp-config.php to read credentials from"));
        }
        let wp = WpCli::new(&ctx.paths().site_dir);
        let user = ctx.run_checked(&wp.config_get("DB_USER")).await?.stdout;
        let password = ctx.run_checked(&wp.config_get("DB_PASSWORD")).await?.stdout;
        let login = DbLogin::new(user.trim(), password.trim());

        let runner = ctx.runner();
        Database::from_config(ctx.config())
            .verify(runner.as_ref(), &login)
            .await?;
        Ok(StepEffect::done().with_note(format!("'{}' can log in", login.user)))
    }
}

#[derive(Debug)]
struct SiteDirectory;

#[async_trait]
impl Step for SiteDirectory {
    fn name(&self) -> &str {
        "site-directory"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let dir = &ctx.paths().site_dir;
        if dir.is_dir() {
            Ok(StepEffect::done().with_note(format!("{} exists", dir.display())))
        } else {
            Err(probe_failed(self.name(), format!("{} is missing", dir.display())))
        }
    }
}

#[derive(Debug)]
struct WordPressInstalled;

#[async_trait]
impl Step for WordPressInstalled {
    fn name(&self) -> &str {
        "wordpress-installed"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let wp = WpCli::new(&ctx.paths().site_dir);
        if !ctx.run(&wp.core_is_installed()).await?.is_success() {
            return Err(probe_failed(self.name(), "WordPress is not installed"));
        }
        let version = ctx.run_checked(&wp.core_version()).await?.stdout;
        Ok(StepEffect::done().with_note(format!("WordPress {}", version.trim())))
    }
}

#[derive(Debug)]
struct SiteEnabled;

#[async_trait]
impl Step for SiteEnabled {
    fn name(&self) -> &str {
        "nginx-site-enabled"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let paths = ctx.paths();
        if !paths.nginx_available.is_file() {
            return Err(probe_failed(
                self.name(),
                format!("{} is missing", paths.nginx_available.display()),
            ));
        }
        if nginx::is_enabled(&paths.nginx_enabled) {
            Ok(StepEffect::done().with_note("enabled"))
        } else {
            Err(probe_failed(
                self.name(),
                format!("{} is not linked", paths.nginx_enabled.display()),
            ))
        }
    }
}

#[derive(Debug)]
struct SiteSummary;

#[async_trait]
impl Step for SiteSummary {
    fn name(&self) -> &str {
        "site-summary"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let site = ctx.site();
        let paths = ctx.paths();
        let domain = site.domain(&ctx.config().site.domain_suffix);
        let mut note = String::new();
        let _ = writeln!(note, "url:          http://{domain}");
        let _ = writeln!(note, "database:     {}", site.db_name());
        let _ = writeln!(note, "docroot:      {}", paths.site_dir.display());
        let _ = writeln!(note, "nginx config: {}", paths.nginx_available.display());
        let _ = writeln!(
            note,
            "nginx link:   {} ({})",
            paths.nginx_enabled.display(),
            if nginx::is_enabled(&paths.nginx_enabled) { "enabled" } else { "disabled" }
        );
        let _ = write!(note, "backups:      {}", paths.backup_dir.display());
        Ok(StepEffect::done().with_note(note))
    }
}

#[derive(Debug)]
struct ListBackups;

#[async_trait]
impl Step for ListBackups {
    fn name(&self) -> &str {
        "list-backups"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let store = SiteBackups::new(&ctx.paths().backup_dir, ctx.config().backups.retention);
        let backups = store.list()?;
        if backups.is_empty() {
            return Ok(StepEffect::done().with_note("no backups"));
        }
        let names: Vec<&str> = backups.iter().map(|b| b.name.as_str()).collect();
        Ok(StepEffect::done().with_note(format!("{} backups: {}", names.len(), names.join(", "))))
    }
}
