//! Site backup and restore.

use super::common::{
    admin_login, remove_tree, CheckDependencies, DatabaseCredentials, RemoveDir,
};
use crate::backup::{Manifest, SiteBackups, DATABASE_DUMP, FILES_ARCHIVE};
use crate::context::RunContext;
use crate::errors::ProvisionError;
use crate::orchestrator::OrchestratorBuilder;
use crate::steps::{RollbackHandler, Step, StepEffect, StepResult};
use crate::system::packages::BACKUP_DEPENDENCIES;
use crate::system::{CommandSpec, Database};
use crate::utils::{file_stamp, now_utc};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Context key holding the backup directory of the run.
pub const BACKUP_DIR: &str = "backup.dir";
const PREVIOUS_FILES: &str = "restore.previous_files";
const PREVIOUS_DATABASE: &str = "restore.previous_database";

pub(crate) fn backup_steps(builder: OrchestratorBuilder) -> OrchestratorBuilder {
    builder
        .step(CheckDependencies::new(BACKUP_DEPENDENCIES))
        .step(DatabaseCredentials)
        .step(DumpDatabase)
        .step(ArchiveFiles)
        .step(WriteManifest)
        .step(PruneBackups)
}

pub(crate) fn restore_steps(
    builder: OrchestratorBuilder,
    requested: Option<String>,
) -> OrchestratorBuilder {
    builder
        .step(CheckDependencies::new(BACKUP_DEPENDENCIES))
        .step(SelectBackup { requested })
        .step(VerifyBackup)
        .step(ConfirmRestore)
        .step(DatabaseCredentials)
        .step(ImportDatabase)
        .step(RestoreFiles)
        .step(DiscardPrevious)
}

fn store(ctx: &RunContext) -> SiteBackups {
    SiteBackups::new(&ctx.paths().backup_dir, ctx.config().backups.retention)
}

fn backup_dir(ctx: &RunContext) -> Result<PathBuf, ProvisionError> {
    ctx.require_value(BACKUP_DIR).map(PathBuf::from)
}

fn archive_command(archive: &Path, parent: &Path, entry: &str) -> CommandSpec {
    CommandSpec::new("tar")
        .arg("-czf")
        .arg(archive.display().to_string())
        .arg("-C")
        .arg(parent.display().to_string())
        .arg(entry)
}

fn extract_command(archive: &Path, parent: &Path) -> CommandSpec {
    CommandSpec::new("tar")
        .arg("-xzf")
        .arg(archive.display().to_string())
        .arg("-C")
        .arg(parent.display().to_string())
}

fn web_root(ctx: &RunContext, step: &str) -> Result<PathBuf, ProvisionError> {
    ctx.paths()
        .site_dir
        .parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ProvisionError::step(step, "site directory has no parent"))
}

#[derive(Debug)]
struct DumpDatabase;

#[async_trait]
impl Step for DumpDatabase {
    fn name(&self) -> &str {
        "dump-database"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let login = admin_login(ctx, self.name())?;
        let dir = store(ctx).next_dir(now_utc());
        ctx.set_value(BACKUP_DIR, dir.display().to_string());

        let db = Database::from_config(ctx.config());
        let command = db.dump_command(&login, &ctx.site().db_name(), &dir.join(DATABASE_DUMP));
        if ctx.is_dry_run() {
            db.run(ctx.runner().as_ref(), &login, &command).await?;
            return Ok(StepEffect::done().with_note(format!("would write {}", dir.display())));
        }

        fs::create_dir_all(&dir)?;
        if let Err(e) = db.run(ctx.runner().as_ref(), &login, &command).await {
            if let Err(cleanup) = remove_tree(&dir) {
                warn!(path = %dir.display(), error = %cleanup, "Failed to remove partial backup");
            }
            return Err(e);
        }
        Ok(StepEffect::undo_with(RemoveDir::new("remove partial backup", dir)))
    }
}

#[derive(Debug)]
struct ArchiveFiles;

#[async_trait]
impl Step for ArchiveFiles {
    fn name(&self) -> &str {
        "archive-files"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let site_dir = ctx.paths().site_dir.clone();
        if !site_dir.is_dir() {
            return Err(ProvisionError::step(
                self.name(),
                format!("{} does not exist", site_dir.display()),
            ));
        }
        let dir = backup_dir(ctx)?;
        let parent = web_root(ctx, self.name())?;
        let command = archive_command(&dir.join(FILES_ARCHIVE), &parent, ctx.site().as_str());
        ctx.run_checked(&command).await?;
        Ok(StepEffect::done())
    }
}

#[derive(Debug)]
struct WriteManifest;

#[async_trait]
impl Step for WriteManifest {
    fn name(&self) -> &str {
        "write-manifest"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let dir = backup_dir(ctx)?;
        if ctx.is_dry_run() {
            return Ok(StepEffect::done().with_note("would write manifest"));
        }
        Manifest::build(
            &dir,
            ctx.site().as_str(),
            &ctx.site().db_name(),
            &[DATABASE_DUMP, FILES_ARCHIVE],
        )?
        .write(&dir)?;
        Ok(StepEffect::done().with_note(format!("backup written to {}", dir.display())))
    }
}

#[derive(Debug)]
struct PruneBackups;

#[async_trait]
impl Step for PruneBackups {
    fn name(&self) -> &str {
        "prune-backups"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let store = store(ctx);
        if ctx.is_dry_run() {
            let excess = store.list()?.len().saturating_sub(ctx.config().backups.retention);
            return Ok(StepEffect::done().with_note(format!("would prune {excess} backups")));
        }
        let removed = store.prune()?;
        Ok(StepEffect::done().with_note(format!("pruned {} old backups", removed.len())))
    }
}

#[derive(Debug)]
struct SelectBackup {
    requested: Option<String>,
}

#[async_trait]
impl Step for SelectBackup {
    fn name(&self) -> &str {
        "select-backup"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let store = store(ctx);
        let entry = match &self.requested {
            Some(name) => store.find(name)?.ok_or_else(|| {
                ProvisionError::Usage(format!("no backup named '{name}' for site {}", ctx.site()))
            })?,
            None => store.latest()?.ok_or_else(|| {
                ProvisionError::step(
                    self.name(),
                    format!("no backups found in {}", store.root().display()),
                )
            })?,
        };
        ctx.set_value(BACKUP_DIR, entry.path.display().to_string());
        Ok(StepEffect::done().with_note(format!("selected {}", entry.name)))
    }
}

#[derive(Debug)]
struct VerifyBackup;

#[async_trait]
impl Step for VerifyBackup {
    fn name(&self) -> &str {
        "verify-backup"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let dir = backup_dir(ctx)?;
        let manifest = Manifest::read(&dir)?;
        if manifest.site != ctx.site().as_str() {
            return Err(ProvisionError::step(
                self.name(),
                format!("backup belongs to site '{}'", manifest.site),
            ));
        }
        for name in [DATABASE_DUMP, FILES_ARCHIVE] {
            if !manifest.contains(name) {
                return Err(ProvisionError::step(
                    self.name(),
                    format!("manifest does not list '{name}'"),
                ));
            }
        }
        manifest.verify(&dir)?;
        Ok(StepEffect::done().with_note(format!("{} files verified", manifest.files.len())))
    }
}

/// Stops for confirmation before anything is overwritten.
#[derive(Debug)]
struct ConfirmRestore;

#[async_trait]
impl Step for ConfirmRestore {
    fn name(&self) -> &str {
        "confirm-restore"
    }

    fn destructive(&self) -> bool {
        true
    }

    fn describe(&self, ctx: &RunContext) -> String {
        format!(
            "overwrite database {} and {} with backup {}",
            ctx.site().db_name(),
            ctx.paths().site_dir.display(),
            ctx.value(BACKUP_DIR).unwrap_or("(none)")
        )
    }

    async fn execute(&self, _ctx: &mut RunContext) -> StepResult {
        Ok(StepEffect::done())
    }
}

#[derive(Debug)]
struct ImportDatabase;

#[async_trait]
impl Step for ImportDatabase {
    fn name(&self) -> &str {
        "import-database"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let login = admin_login(ctx, self.name())?;
        let db = Database::from_config(ctx.config());
        let runner = ctx.runner();
        let name = ctx.site().db_name();
        let dump = backup_dir(ctx)?.join(DATABASE_DUMP);

        let previous = if db.database_exists(runner.as_ref(), &login, &name).await? {
            let file = ctx
                .paths()
                .backup_dir
                .join(format!("pre-restore-{}.sql", file_stamp(now_utc())));
            if !ctx.is_dry_run() {
                fs::create_dir_all(&ctx.paths().backup_dir)?;
            }
            db.run(runner.as_ref(), &login, &db.dump_command(&login, &name, &file))
                .await?;
            ctx.set_value(PREVIOUS_DATABASE, file.display().to_string());
            Some(file)
        } else {
            db.execute(
                runner.as_ref(),
                &login,
                &format!(
                    "CREATE DATABASE `{name}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci;"
                ),
            )
            .await?;
            None
        };

        let handler = UndoImport { name, previous };
        if let Err(e) = db
            .run(runner.as_ref(), &login, &db.import_command(&login, &handler.name, &dump))
            .await
        {
            if let Err(undo) = handler.undo(ctx).await {
                warn!(database = %handler.name, error = %undo, "Failed to undo partial import");
            }
            return Err(e);
        }
        Ok(StepEffect::undo_with(handler))
    }
}

/// Puts the database back the way it was before the import.
struct UndoImport {
    name: String,
    previous: Option<PathBuf>,
}

#[async_trait]
impl RollbackHandler for UndoImport {
    fn name(&self) -> &str {
        "restore previous database"
    }

    async fn rollback(&self, ctx: &mut RunContext) -> Result<(), ProvisionError> {
        self.undo(ctx).await
    }
}

impl UndoImport {
    async fn undo(&self, ctx: &RunContext) -> Result<(), ProvisionError> {
        let login = admin_login(ctx, "restore previous database")?;
        let db = Database::from_config(ctx.config());
        let runner = ctx.runner();
        match &self.previous {
            Some(file) => db
                .run(runner.as_ref(), &login, &db.import_command(&login, &self.name, file))
                .await
                .map(drop),
            None => db
                .execute(
                    runner.as_ref(),
                    &login,
                    &format!("DROP DATABASE IF EXISTS `{}`;", self.name),
                )
                .await
                .map(drop),
        }
    }
}

#[derive(Debug)]
struct RestoreFiles;

#[async_trait]
impl Step for RestoreFiles {
    fn name(&self) -> &str {
        "restore-files"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let site_dir = ctx.paths().site_dir.clone();
        let parent = web_root(ctx, self.name())?;
        let command = extract_command(&backup_dir(ctx)?.join(FILES_ARCHIVE), &parent);

        if ctx.is_dry_run() {
            ctx.run_checked(&command).await?;
            return Ok(StepEffect::done()
                .with_note(format!("would replace {}", site_dir.display())));
        }

        let aside = if site_dir.exists() {
            let aside = parent.join(format!(
                "{}.pre-restore-{}",
                ctx.site(),
                file_stamp(now_utc())
            ));
            fs::rename(&site_dir, &aside)?;
            Some(aside)
        } else {
            None
        };
        fs::create_dir_all(&parent)?;

        let handler = PutBackFiles { site_dir, aside };
        if let Err(e) = ctx.run_checked(&command).await {
            if let Err(undo) = handler.put_back() {
                let path = handler.site_dir.display();
                warn!(path = %path, error = %undo, "Failed to put files back");
            }
            return Err(e);
        }
        if let Some(aside) = &handler.aside {
            ctx.set_value(PREVIOUS_FILES, aside.display().to_string());
        }
        Ok(StepEffect::undo_with(handler))
    }
}

/// Replaces restored files with the ones moved aside.
struct PutBackFiles {
    site_dir: PathBuf,
    aside: Option<PathBuf>,
}

impl PutBackFiles {
    fn put_back(&self) -> std::io::Result<()> {
        remove_tree(&self.site_dir)?;
        if let Some(aside) = &self.aside {
            fs::rename(aside, &self.site_dir)?;
        }
        Ok(())
    }
}

#[async_trait]
impl RollbackHandler for PutBackFiles {
    fn name(&self) -> &str {
        "put back previous files"
    }

    async fn rollback(&self, _ctx: &mut RunContext) -> Result<(), ProvisionError> {
        self.put_back()?;
        Ok(())
    }
}

/// Deletes the copies a restore keeps until it has succeeded.
#[derive(Debug)]
struct DiscardPrevious;

#[async_trait]
impl Step for DiscardPrevious {
    fn name(&self) -> &str {
        "discard-previous"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        let mut removed = 0;
        if let Some(dir) = ctx.value(PREVIOUS_FILES) {
            if remove_tree(Path::new(dir))? {
                removed += 1;
            }
        }
        if let Some(file) = ctx.value(PREVIOUS_DATABASE) {
            if !ctx.is_dry_run() {
                match fs::remove_file(file) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(StepEffect::done().with_note(format!("discarded {removed} previous copies")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RunState;
    use crate::orchestrator::Orchestrator;
    use crate::prompt::ScriptedPrompter;
    use crate::system::{CommandOutput, Stdin};
    use crate::testing::{context_at, ScriptedRunner};
    use crate::workflows::common::ADMIN_PASSWORD_PROMPT;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn seed_backup(ctx: &RunContext, second: u32) -> PathBuf {
        let at = chrono::Utc.with_ymd_and_hms(2026, 5, 1, 9, 30, second).unwrap();
        let dir = store(ctx).next_dir(at);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(DATABASE_DUMP), "-- dump").unwrap();
        fs::write(dir.join(FILES_ARCHIVE), "archive").unwrap();
        Manifest::build(&dir, "blog", "wp_blog", &[DATABASE_DUMP, FILES_ARCHIVE])
            .unwrap()
            .write(&dir)
            .unwrap();
        dir
    }

    fn password() -> ScriptedPrompter {
        ScriptedPrompter::new().with_text(ADMIN_PASSWORD_PROMPT, "s3cret")
    }

    #[tokio::test]
    async fn test_backup_writes_manifest() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner.clone())
            .with_prompter(Arc::new(password()));
        fs::create_dir_all(&ctx.paths().site_dir).unwrap();

        // The scripted runner never writes files, so stand in for the tools
        // by creating the artefacts the manifest checksums.
        let plan = Orchestrator::builder("backup")
            .step(DatabaseCredentials)
            .step(DumpDatabase)
            .step(crate::steps::FnStep::new("fake-tools", |ctx: &mut RunContext| {
                let dir = backup_dir(ctx)?;
                fs::write(dir.join(DATABASE_DUMP), "-- dump")?;
                fs::write(dir.join(FILES_ARCHIVE), "archive")?;
                Ok(StepEffect::done())
            }))
            .step(ArchiveFiles)
            .step(WriteManifest)
            .step(PruneBackups)
            .build()
            .unwrap();
        plan.run(&mut ctx).await.unwrap();

        let backups = store(&ctx).list().unwrap();
        assert_eq!(backups.len(), 1);
        let manifest = Manifest::read(&backups[0].path).unwrap();
        assert_eq!(manifest.database, "wp_blog");
        manifest.verify(&backups[0].path).unwrap();
        assert!(runner.ran("mariadb-dump"));
        assert!(runner.ran("-czf"));
    }

    #[tokio::test]
    async fn test_failed_dump_leaves_no_directory() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().failing("mariadb-dump", 2, "Unknown database"));
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner)
            .with_prompter(Arc::new(password()));

        let plan = backup_steps(Orchestrator::builder("backup")).build().unwrap();
        let outcome = plan.execute(&mut ctx).await;

        assert_eq!(outcome.report.state, RunState::RolledBack);
        assert_eq!(outcome.error.unwrap().exit_code(), 5);
        assert!(store(&ctx).list().unwrap().is_empty());
        let leftovers = fs::read_dir(&ctx.paths().backup_dir)
            .map(|d| d.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_restore_latest() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let prompter = password().with_confirm("confirm.confirm-restore", true);
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner.clone())
            .with_prompter(Arc::new(prompter));
        seed_backup(&ctx, 0);
        let newest = seed_backup(&ctx, 1);
        fs::create_dir_all(ctx.paths().site_dir.join("old")).unwrap();

        let plan = restore_steps(Orchestrator::builder("restore"), None).build().unwrap();
        plan.run(&mut ctx).await.unwrap();

        assert_eq!(ctx.value(BACKUP_DIR), Some(newest.display().to_string().as_str()));
        let imported = runner.commands().into_iter().any(|c| {
            c.stdin == Stdin::File(newest.join(DATABASE_DUMP))
        });
        assert!(imported);
        assert!(runner.ran("-xzf"));
        let siblings: Vec<_> = fs::read_dir(ctx.paths().site_dir.parent().unwrap())
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        assert!(siblings.is_empty(), "moved-aside files should be discarded");
    }

    fn sql_sent(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .commands()
            .into_iter()
            .filter_map(|c| match c.stdin {
                Stdin::Text(sql) => Some(sql),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failed_import_drops_database_it_created() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().failing(
            "--user=root wp_blog",
            1,
            "ERROR 1064 (42000): syntax error at line 12",
        ));
        let prompter = password().with_confirm("confirm.confirm-restore", true);
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner.clone())
            .with_prompter(Arc::new(prompter));
        seed_backup(&ctx, 0);

        let plan = restore_steps(Orchestrator::builder("restore"), None).build().unwrap();
        let outcome = plan.execute(&mut ctx).await;

        assert_eq!(outcome.report.state, RunState::RolledBack);
        assert_eq!(outcome.error.unwrap().exit_code(), 5);
        let sql = sql_sent(&runner);
        assert!(sql.iter().any(|s| s.starts_with("CREATE DATABASE `wp_blog`")));
        assert_eq!(sql.last().map(String::as_str), Some("DROP DATABASE IF EXISTS `wp_blog`;"));
    }

    #[tokio::test]
    async fn test_failed_import_reloads_safety_dump() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(
            ScriptedRunner::new()
                .on_stdin("SCHEMATA", CommandOutput::success("wp_blog\n"))
                .failing("--user=root wp_blog", 1, "ERROR 2013: Lost connection"),
        );
        let mut ctx = context_at(root.path(), "blog").with_runner(runner.clone());
        ctx.credentials_mut().db_admin = Some(crate::context::DbLogin::new("root", "s3cret"));
        let dir = seed_backup(&ctx, 0);
        ctx.set_value(BACKUP_DIR, dir.display().to_string());

        assert!(ImportDatabase.execute(&mut ctx).await.is_err());

        let safety = PathBuf::from(ctx.value(PREVIOUS_DATABASE).unwrap());
        let imports: Vec<Stdin> = runner
            .commands()
            .into_iter()
            .filter(|c| matches!(c.stdin, Stdin::File(_)))
            .map(|c| c.stdin)
            .collect();
        assert_eq!(
            imports,
            vec![Stdin::File(dir.join(DATABASE_DUMP)), Stdin::File(safety)]
        );
        assert!(sql_sent(&runner).iter().all(|s| !s.contains("CREATE DATABASE")));
    }

    #[tokio::test]
    async fn test_restore_rejects_tampered_backup() {
        let root = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let mut ctx = context_at(root.path(), "blog")
            .with_runner(runner.clone())
            .with_prompter(Arc::new(password()));
        let dir = seed_backup(&ctx, 0);
        fs::write(dir.join(DATABASE_DUMP), "-- tampered").unwrap();

        let plan = restore_steps(Orchestrator::builder("restore"), None).build().unwrap();
        let err = plan.run(&mut ctx).await.unwrap_err();

        assert!(err.to_string().contains("checksum mismatch"));
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_restore_unknown_backup_is_usage_error() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = context_at(root.path(), "blog");
        seed_backup(&ctx, 0);

        let plan = restore_steps(Orchestrator::builder("restore"), Some("nope".into()))
            .build()
            .unwrap();
        let err = plan.run(&mut ctx).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_restore_files_failure_puts_files_back() {
        let root = tempfile::tempdir().unwrap();
        let runner =
            Arc::new(ScriptedRunner::new().failing("-xzf", 2, "gzip: unexpected end of file"));
        let mut ctx = context_at(root.path(), "blog").with_runner(runner);
        let dir = seed_backup(&ctx, 0);
        ctx.set_value(BACKUP_DIR, dir.display().to_string());
        let site_dir = ctx.paths().site_dir.clone();
        fs::create_dir_all(&site_dir).unwrap();
        fs::write(site_dir.join("index.php"), "<?php").unwrap();

        assert!(RestoreFiles.execute(&mut ctx).await.is_err());
        assert_eq!(fs::read_to_string(site_dir.join("index.php")).unwrap(), "<?php");
    }
}
