//! Provisioning a new site.

use super::common::{
    admin_login, confirm_or_conflict, drop_site_database, CheckDependencies, DatabaseCredentials,
    DropDatabase, RemoveDir, RevertConfig,
};
use crate::backup::ConfigSnapshots;
use crate::context::{DbLogin, RunContext, WpAdmin};
use crate::edit::{CommentStyle, ConfigDocument, ConfigEdit};
use crate::errors::ProvisionError;
use crate::orchestrator::OrchestratorBuilder;
use crate::prompt::Prompt;
use crate::steps::{RollbackHandler, Step, StepEffect, StepResult};
use crate::system::database::create_statements;
use crate::system::packages::INSTALL_DEPENDENCIES;
use crate::system::{nginx, services, CommandSpec, Database, WpCli};
use crate::utils::generate_password;
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use tracing::warn;

/// Length of generated passwords.
pub const PASSWORD_LEN: usize = 24;

/// Context key holding the site database name.
pub const DB_NAME: &str = "db.name";
/// Context key holding the site URL.
pub const SITE_URL: &str = "site.url";

pub(crate) fn steps(builder: OrchestratorBuilder) -> OrchestratorBuilder {
    builder
        .step(CheckDependencies::new(INSTALL_DEPENDENCIES))
        .step(DatabaseCredentials)
        .step(CreateSiteDir)
        .step(CreateDatabase)
        .step(DownloadWordPress)
        .step(WriteWpConfig)
        .step(InstallWordPress)
        .step(InstallPlugins)
        .step(InstallThemes)
        .step(TunePhp)
        .step(WriteServerBlock)
        .step(EnableSite)
        .step(SetPermissions)
}

fn wp(ctx: &RunContext) -> WpCli {
    WpCli::new(&ctx.paths().site_dir)
}

#[derive(Debug)]
struct CreateSiteDir;

#[async_trait]
impl Step for CreateSiteDir {
    fn name(&self) -> &str {
        "create-site-dir"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let dir = ctx.paths().site_dir.clone();
        if dir.exists() {
            let prompt = Prompt::new(
                "confirm.reuse-site-dir",
                format!("{} already exists. Install into it anyway?", dir.display()),
            );
            confirm_or_conflict(ctx, &prompt, dir.display().to_string())?;
            return Ok(StepEffect::done().with_note(format!("reusing {}", dir.display())));
        }
        if ctx.is_dry_run() {
            return Ok(StepEffect::done().with_note(format!("would create {}", dir.display())));
        }
        fs::create_dir_all(&dir)?;
        Ok(StepEffect::undo_with(RemoveDir::new("remove site directory", dir)))
    }
}

#[derive(Debug)]
struct CreateDatabase;

#[async_trait]
impl Step for CreateDatabase {
    fn name(&self) -> &str {
        "create-database"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let login = admin_login(ctx, self.name())?;
        let db = Database::from_config(ctx.config());
        let runner = ctx.runner();
        let name = ctx.site().db_name();
        let user = name.clone();

        if db.database_exists(runner.as_ref(), &login, &name).await? {
            let prompt = Prompt::new(
                "confirm.replace-database",
                format!("Database '{name}' already exists. Drop and recreate it?"),
            );
            confirm_or_conflict(ctx, &prompt, format!("database '{name}'"))?;
            drop_site_database(ctx, self.name(), &name, &user).await?;
        }

        let password = generate_password(PASSWORD_LEN);
        if let Err(e) = db
            .execute(runner.as_ref(), &login, &create_statements(&name, &user, &password))
            .await
        {
            if let Err(undo) = drop_site_database(ctx, self.name(), &name, &user).await {
                warn!(database = %name, error = %undo, "Failed to drop partly created database");
            }
            return Err(e);
        }

        ctx.set_value(DB_NAME, name.clone());
        ctx.credentials_mut().db_site = Some(DbLogin::new(user.clone(), password));
        Ok(StepEffect::undo_with(DropDatabase::new(&name, user))
            .with_note(format!("created database '{name}'")))
    }
}

#[derive(Debug)]
struct DownloadWordPress;

#[async_trait]
impl Step for DownloadWordPress {
    fn name(&self) -> &str {
        "download-wordpress"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        if ctx.paths().site_dir.join("wp-includes").is_dir() {
            return Ok(StepEffect::done().with_note("WordPress core already present"));
        }
        let command = wp(ctx).core_download(&ctx.config().site.locale);
        ctx.run_checked(&command).await?;
        Ok(StepEffect::done())
    }
}

#[derive(Debug)]
struct WriteWpConfig;

#[async_trait]
impl Step for WriteWpConfig {
    fn name(&self) -> &str {
        "write-wp-config"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let login = ctx
            .credentials()
            .db_site
            .clone()
            .ok_or_else(|| ProvisionError::step(self.name(), "site database account not created"))?;
        let db_name = ctx.require_value(DB_NAME)?.to_string();
        let host = ctx.config().database.host.clone();
        let mut command =
            wp(ctx).config_create(&db_name, &login.user, &host, login.password.expose());

        let path = ctx.paths().wp_config.clone();
        if path.exists() {
            let prompt = Prompt::new(
                "confirm.replace-wp-config",
                format!("{} already exists. Overwrite it?", path.display()),
            );
            confirm_or_conflict(ctx, &prompt, path.display().to_string())?;
            command = command.arg("--force");
        }
        ctx.run_checked(&command).await?;
        Ok(StepEffect::done())
    }
}

#[derive(Debug)]
struct InstallWordPress;

#[async_trait]
impl Step for InstallWordPress {
    fn name(&self) -> &str {
        "install-wordpress"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let domain = ctx.site().domain(&ctx.config().site.domain_suffix);
        let url = format!("http://{domain}");
        ctx.set_value(SITE_URL, url.clone());

        let cli = wp(ctx);
        if !ctx.is_dry_run() && ctx.run(&cli.core_is_installed()).await?.is_success() {
            return Ok(StepEffect::done().with_note(format!("already installed at {url}")));
        }

        let site = &ctx.config().site;
        let admin = WpAdmin {
            user: site.admin_user.clone(),
            email: site.admin_email.clone(),
            password: generate_password(PASSWORD_LEN).into(),
        };
        let command = cli.core_install(
            &url,
            ctx.site().as_str(),
            &admin.user,
            &admin.email,
            admin.password.expose(),
        );
        ctx.run_checked(&command).await?;

        let note = format!("installed at {url}, administrator '{}'", admin.user);
        ctx.credentials_mut().wp_admin = Some(admin);
        Ok(StepEffect::done().with_note(note))
    }
}

#[derive(Debug)]
struct InstallPlugins;

#[async_trait]
impl Step for InstallPlugins {
    fn name(&self) -> &str {
        "install-plugins"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let plugins = ctx.config().site.plugins.clone();
        if plugins.is_empty() {
            return Ok(StepEffect::done().with_note("no plugins configured"));
        }
        let cli = wp(ctx);
        for plugin in &plugins {
            ctx.run_checked(&cli.plugin_install(plugin)).await?;
        }
        Ok(StepEffect::done().with_note(format!("installed {}", plugins.join(", "))))
    }
}

#[derive(Debug)]
struct InstallThemes;

#[async_trait]
impl Step for InstallThemes {
    fn name(&self) -> &str {
        "install-themes"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let themes = ctx.config().site.themes.clone();
        if themes.is_empty() {
            return Ok(StepEffect::done().with_note("no themes configured"));
        }
        let cli = wp(ctx);
        for (i, theme) in themes.iter().enumerate() {
            ctx.run_checked(&cli.theme_install(theme, i == 0)).await?;
        }
        let note = format!("installed {}, active: {}", themes.join(", "), themes[0]);
        Ok(StepEffect::done().with_note(note))
    }
}

#[derive(Debug)]
struct TunePhp;

#[async_trait]
impl Step for TunePhp {
    fn name(&self) -> &str {
        "tune-php"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let path = ctx.paths().php_ini.clone();
        let edits: Vec<ConfigEdit> = ctx
            .config()
            .php
            .settings
            .iter()
            .map(|(key, value)| ConfigEdit::set_key(key, value))
            .collect();
        let doc = ConfigDocument::new(&path).with_comment_style(CommentStyle::Semicolon);

        let current = doc.read()?;
        let updated = doc.render(current.as_deref().unwrap_or(""), &edits)?;
        if current.as_deref() == Some(updated.as_str()) {
            return Ok(StepEffect::done().with_note("php.ini already tuned"));
        }
        if ctx.is_dry_run() {
            return Ok(StepEffect::done().with_note(format!("would update {}", path.display())));
        }

        ConfigSnapshots::new(&ctx.paths().snapshot_dir, ctx.config().backups.retention)
            .snapshot_file(&path)?;
        let change = doc.apply(&edits)?;

        let unit = ctx.config().services.php_fpm.clone();
        if let Err(e) = services::restart(ctx, &unit).await {
            if let Err(revert) = change.revert() {
                warn!(path = %path.display(), error = %revert, "Failed to restore php.ini");
            }
            return Err(e);
        }
        Ok(StepEffect::undo_with(RevertConfig::new("restore php.ini", change).restarting(unit)))
    }
}

#[derive(Debug)]
struct WriteServerBlock;

#[async_trait]
impl Step for WriteServerBlock {
    fn name(&self) -> &str {
        "write-nginx-config"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let path = ctx.paths().nginx_available.clone();
        let domain = ctx.site().domain(&ctx.config().site.domain_suffix);
        let content = nginx::server_block(
            &domain,
            &ctx.paths().site_dir,
            &ctx.config().paths.php_fpm_socket,
        );
        let doc = ConfigDocument::new(&path);

        let existing = doc.read()?;
        if let Some(existing) = &existing {
            if *existing == content {
                return Ok(StepEffect::done().with_note("server block up to date"));
            }
            if existing.lines().next() != Some(nginx::MANAGED_HEADER) {
                let prompt = Prompt::new(
                    "confirm.replace-nginx-config",
                    format!("{} was not written by siteprov. Replace it?", path.display()),
                );
                confirm_or_conflict(ctx, &prompt, path.display().to_string())?;
            }
        }
        if ctx.is_dry_run() {
            return Ok(StepEffect::done().with_note(format!("would write {}", path.display())));
        }

        ConfigSnapshots::new(&ctx.paths().snapshot_dir, ctx.config().backups.retention)
            .snapshot_file(&path)?;
        let change = doc.replace(&content)?;
        Ok(StepEffect::undo_with(RevertConfig::new("restore nginx server block", change)))
    }
}

#[derive(Debug)]
struct EnableSite;

#[async_trait]
impl Step for EnableSite {
    fn name(&self) -> &str {
        "enable-nginx-site"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let available = ctx.paths().nginx_available.clone();
        let enabled = ctx.paths().nginx_enabled.clone();
        let unit = ctx.config().services.nginx.clone();

        let created = if ctx.is_dry_run() {
            false
        } else {
            nginx::enable(&available, &enabled)?
        };

        if let Err(e) = test_and_reload(ctx, &unit).await {
            if created {
                if let Err(unlink) = nginx::disable(&enabled) {
                    warn!(path = %enabled.display(), error = %unlink, "Failed to unlink site");
                }
            }
            return Err(e);
        }

        if created {
            Ok(StepEffect::undo_with(DisableSite { enabled, unit }))
        } else if ctx.is_dry_run() {
            Ok(StepEffect::done().with_note(format!("would link {}", enabled.display())))
        } else {
            Ok(StepEffect::done().with_note("already enabled"))
        }
    }
}

async fn test_and_reload(ctx: &RunContext, unit: &str) -> Result<(), ProvisionError> {
    ctx.run_checked(&ctx.privileged(nginx::test_config())).await?;
    services::reload(ctx, unit).await
}

struct DisableSite {
    enabled: PathBuf,
    unit: String,
}

#[async_trait]
impl RollbackHandler for DisableSite {
    fn name(&self) -> &str {
        "disable nginx site"
    }

    async fn rollback(&self, ctx: &mut RunContext) -> Result<(), ProvisionError> {
        nginx::disable(&self.enabled)?;
        services::reload(ctx, &self.unit).await
    }
}

#[derive(Debug)]
struct SetPermissions;

#[async_trait]
impl Step for SetPermissions {
    fn name(&self) -> &str {
        "set-permissions"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let system = &ctx.config().system;
        let owner = format!("{}:{}", system.web_user, system.web_group);
        let command = CommandSpec::new("chown")
            .args(["-R", owner.as_str()])
            .arg(ctx.paths().site_dir.display().to_string());
        ctx.run_checked(&ctx.privileged(command)).await?;
        Ok(StepEffect::done().with_note(format!("owned by {owner}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunOptions;
    use crate::core::RunState;
    use crate::orchestrator::Orchestrator;
    use crate::prompt::ScriptedPrompter;
    use crate::system::{CommandOutput, RecordingRunner, Stdin};
    use crate::testing::{context_at, ScriptedRunner};
    use crate::workflows::common::ADMIN_PASSWORD_PROMPT;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn plan() -> Orchestrator {
        steps(Orchestrator::builder("install")).build().unwrap()
    }

    fn answers() -> ScriptedPrompter {
        ScriptedPrompter::new().with_text(ADMIN_PASSWORD_PROMPT, "s3cret")
    }

    #[test]
    fn test_step_order_and_flags() {
        let plan = plan();
        assert_eq!(
            plan.step_names(),
            vec![
                "check-dependencies",
                "database-credentials",
                "create-site-dir",
                "create-database",
                "download-wordpress",
                "write-wp-config",
                "install-wordpress",
                "install-plugins",
                "install-themes",
                "tune-php",
                "write-nginx-config",
                "enable-nginx-site",
                "set-permissions",
            ]
        );
        let optional: Vec<&str> = plan
            .steps()
            .iter()
            .filter(|s| !s.is_required())
            .map(|s| s.name())
            .collect();
        assert_eq!(optional, vec!["install-plugins", "install-themes", "set-permissions"]);
    }

    #[tokio::test]
    async fn test_install_happy_path() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().failing("core is-installed", 1, ""));
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner.clone())
            .with_prompter(Arc::new(answers()));

        let report = plan().run(&mut ctx).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        let paths = ctx.paths().clone();
        assert!(paths.site_dir.is_dir());
        let php_ini = fs::read_to_string(&paths.php_ini).unwrap();
        assert!(php_ini.contains("memory_limit = 256M"));
        let server = fs::read_to_string(&paths.nginx_available).unwrap();
        assert!(server.contains("server_name blog.local;"));
        assert!(nginx::is_enabled(&paths.nginx_enabled));

        assert!(runner.ran("wp core download"));
        assert!(runner.ran("systemctl reload nginx"));
        assert!(runner.ran("systemctl restart php-fpm"));
        assert_eq!(ctx.value(SITE_URL), Some("http://blog.local"));
        let admin = ctx.credentials().wp_admin.as_ref().unwrap();
        assert_eq!(admin.password.expose().len(), PASSWORD_LEN);

        let lines: Vec<String> = runner.command_lines();
        assert!(lines.iter().all(|l| !l.contains("s3cret")));
    }

    #[tokio::test]
    async fn test_nginx_failure_rolls_back_everything() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new()
                .failing("core is-installed", 1, "")
                .failing("nginx -t", 1, "nginx: [emerg] unknown directive"),
        );
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner.clone())
            .with_prompter(Arc::new(answers()));
        let paths = ctx.paths().clone();

        let outcome = plan().execute(&mut ctx).await;

        assert_eq!(outcome.report.state, RunState::RolledBack);
        assert_eq!(outcome.error.unwrap().exit_code(), 5);
        let rolled: Vec<&str> = outcome.report.rollbacks.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            rolled,
            vec![
                "restore nginx server block",
                "restore php.ini",
                "drop database wp_blog",
                "remove site directory",
            ]
        );
        assert!(!paths.site_dir.exists());
        assert!(!paths.nginx_available.exists());
        assert!(!paths.php_ini.exists());
        assert!(!paths.nginx_enabled.exists());
        let dropped = runner.commands().iter().any(|c| {
            let drop = "DROP DATABASE IF EXISTS `wp_blog`";
            matches!(&c.stdin, Stdin::Text(sql) if sql.contains(drop))
        });
        assert!(dropped);
    }

    #[tokio::test]
    async fn test_failed_account_creation_drops_database() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().on_stdin(
            "CREATE USER",
            CommandOutput::failure(1, "ERROR 1396 (HY000): Operation CREATE USER failed"),
        ));
        let mut ctx = context_at(root.path(), "blog").with_runner(runner.clone());
        ctx.credentials_mut().db_admin = Some(DbLogin::new("root", "s3cret"));

        let err = CreateDatabase.execute(&mut ctx).await.unwrap_err();

        assert_eq!(err.exit_code(), 5);
        let sql: Vec<String> = runner
            .commands()
            .into_iter()
            .filter_map(|c| match c.stdin {
                Stdin::Text(sql) => Some(sql),
                _ => None,
            })
            .collect();
        assert_eq!(sql.len(), 3);
        assert!(sql[1].starts_with("CREATE DATABASE `wp_blog`"));
        assert!(sql[2].contains("DROP DATABASE IF EXISTS `wp_blog`"));
        assert!(ctx.credentials().db_site.is_none());
    }

    #[tokio::test]
    async fn test_existing_site_dir_is_conflict() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = context_at(root.path(), "blog");
        fs::create_dir_all(&ctx.paths().site_dir).unwrap();

        let err = CreateSiteDir.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, ProvisionError::Conflict { .. }));
        assert_eq!(err.exit_code(), 6);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner.clone())
            .with_options(RunOptions {
                auto_confirm: false,
                dry_run: true,
            });

        let report = plan().run(&mut ctx).await.unwrap();

        assert_eq!(report.state, RunState::Completed);
        assert!(!ctx.paths().site_dir.exists());
        assert!(!ctx.paths().php_ini.exists());
        assert!(runner.commands().iter().any(|c| c.mentions("download")));
    }
}
