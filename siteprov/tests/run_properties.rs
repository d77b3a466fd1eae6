//! End-to-end checks of run sequencing, rollback and the run log.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use siteprov::prelude::*;
use siteprov::steps::{FnRollback, FnStep};
use siteprov::testing::{
    context_at, journal, FailingStep, RecordingStep, ScriptedPrompter, ScriptedRunner, SuccessStep,
};
use std::fs;
use std::path::PathBuf;

/// Creates a directory and removes it again on rollback.
fn create_dir(path: PathBuf) -> impl Step {
    FnStep::new("create-dir", move |_ctx: &mut RunContext| {
        fs::create_dir_all(&path)?;
        let created = path.clone();
        Ok(StepEffect::undo_with(FnRollback::new(
            "remove directory",
            move |_ctx: &mut RunContext| {
                fs::remove_dir_all(&created)?;
                Ok(())
            },
        )))
    })
}

/// Runs a database statement through the command runner.
#[derive(Debug)]
struct CreateDatabase;

#[async_trait]
impl Step for CreateDatabase {
    fn name(&self) -> &str {
        "create-database"
    }

    async fn execute(&self, ctx: &mut RunContext) -> StepResult {
        ctx.run_checked(&CommandSpec::new("mariadb").arg("--batch"))
            .await?;
        Ok(StepEffect::done())
    }
}

#[tokio::test]
async fn failed_database_removes_directory_and_logs_everything() {
    let root = tempfile::tempdir().unwrap();
    let site_dir = root.path().join("srv/http/blog");
    let runner =
        Arc::new(ScriptedRunner::new().failing("mariadb", 1, "ERROR 1007: database exists"));
    let log = RunLog::create(&root.path().join("logs"), "blog", "install").unwrap();
    let log_path = log.path().unwrap().to_path_buf();
    let mut ctx = context_at(root.path(), "blog").with_runner(runner).with_log(log);

    let plan = Orchestrator::builder("install")
        .step(create_dir(site_dir.clone()))
        .step(CreateDatabase)
        .build()
        .unwrap();
    let err = plan.run(&mut ctx).await.unwrap_err();

    assert_eq!(err.exit_code(), 5);
    assert!(!site_dir.exists());

    let records = RunLog::read_file(&log_path).unwrap();
    let summary: Vec<(LogLevel, &str)> = records
        .iter()
        .map(|r| (r.level, r.message.split(':').next().unwrap_or("")))
        .collect();
    assert_eq!(
        summary,
        vec![
            (LogLevel::Ok, "step create-dir"),
            (LogLevel::Error, "step create-database"),
            (LogLevel::Ok, "rollback remove directory"),
            (LogLevel::Error, "run rolled back after 'create-database' failed"),
        ]
    );
    assert!(records[1].message.contains("database exists"));
    let timestamps: Vec<_> = records.iter().map(|r| r.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);
}

#[tokio::test]
async fn rollback_runs_each_handler_once_newest_first() {
    let root = tempfile::tempdir().unwrap();
    let mut ctx = context_at(root.path(), "blog");
    let journal = journal();

    let plan = Orchestrator::builder("install")
        .step(RecordingStep::new("a", &journal))
        .step(RecordingStep::new("b", &journal))
        .step(RecordingStep::new("c", &journal).optional())
        .step(FailingStep::new("d", "boom"))
        .step(RecordingStep::new("e", &journal))
        .build()
        .unwrap();
    let outcome = plan.execute(&mut ctx).await;

    assert_eq!(outcome.report.state, RunState::RolledBack);
    assert_eq!(
        *journal.lock(),
        vec!["run:a", "run:b", "run:c", "rollback:c", "rollback:b", "rollback:a"]
    );
    assert_eq!(outcome.report.rollbacks.len(), 3);
}

#[tokio::test]
async fn optional_failure_does_not_stop_the_run() {
    let root = tempfile::tempdir().unwrap();
    let mut ctx = context_at(root.path(), "blog");
    let journal = journal();

    let plan = Orchestrator::builder("install")
        .step(RecordingStep::new("a", &journal))
        .step(FailingStep::new("plugins", "download failed").optional())
        .step(RecordingStep::new("b", &journal))
        .build()
        .unwrap();
    let report = plan.run(&mut ctx).await.unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(*journal.lock(), vec!["run:a", "run:b"]);
    assert_eq!(report.warnings().count(), 1);
    assert!(report.rollbacks.is_empty());
    // One record per step plus the terminal record.
    assert_eq!(ctx.log().records().len(), 4);
    assert_eq!(ctx.log().records()[1].level, LogLevel::Warn);
}

#[tokio::test]
async fn destructive_step_needs_confirmation_or_override() {
    let root = tempfile::tempdir().unwrap();
    let plan = Orchestrator::builder("remove")
        .step(SuccessStep::new("drop-database").mark_destructive())
        .build()
        .unwrap();

    let mut denied = context_at(root.path(), "blog");
    let err = plan.run(&mut denied).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let prompter = ScriptedPrompter::new().with_confirm("confirm.drop-database", true);
    let mut confirmed = context_at(root.path(), "blog").with_prompter(Arc::new(prompter));
    assert!(plan.run(&mut confirmed).await.is_ok());

    let mut unattended = context_at(root.path(), "blog").with_options(RunOptions {
        auto_confirm: true,
        dry_run: false,
    });
    assert!(plan.run(&mut unattended).await.is_ok());
}

#[tokio::test]
async fn dry_run_install_records_commands_only() {
    let root = tempfile::tempdir().unwrap();
    let recorder = Arc::new(RecordingRunner::new());
    let prompter = ScriptedPrompter::new();
    let mut ctx = context_at(root.path(), "blog")
        .with_runner(Arc::clone(&recorder) as Arc<dyn CommandRunner>)
        .with_prompter(Arc::new(prompter))
        .with_options(RunOptions {
            auto_confirm: false,
            dry_run: true,
        });

    let outcome = siteprov::workflows::run(&Operation::Install, &mut ctx).await;

    assert!(outcome.error.is_none(), "{:?}", outcome.error);
    assert!(!ctx.paths().site_dir.exists());
    assert!(!ctx.paths().nginx_available.exists());
    let lines: Vec<String> = recorder.commands().iter().map(ToString::to_string).collect();
    assert!(lines.iter().any(|l| l.starts_with("wp core download")));
    assert!(lines.iter().any(|l| l == "nginx -t"));
}
