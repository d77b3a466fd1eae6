//! Wires arguments, configuration and the terminal to a workflow run.
//!
//! Everything the operator sees is printed here: step results and notes on
//! stdout, fatal errors on stderr.

use crate::args::Cli;
use anyhow::Context as _;
use clap::{CommandFactory, Parser};
use siteprov::config::ProvisionConfig;
use siteprov::context::{RunContext, RunOptions, SiteName};
use siteprov::core::{RunReport, StepStatus};
use siteprov::errors::{ErrorKind, ProvisionError};
use siteprov::events::LoggingEventSink;
use siteprov::observability::{init_tracing, run_span};
use siteprov::prompt::{AutoConfirmPrompter, Prompter, ScriptedPrompter, TerminalPrompter};
use siteprov::runlog::RunLog;
use siteprov::system::{RecordingRunner, SystemCommandRunner};
use siteprov::workflows::{self, Operation};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{warn, Instrument};

/// Parses arguments and runs the selected operation.
///
/// Returns the process exit code on failure.
pub fn run() -> Result<(), i32> {
    let cli = Cli::parse();
    let Some(site) = cli.site.clone() else {
        println!("{}", Cli::command().render_help());
        return Err(ErrorKind::Usage.exit_code());
    };

    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("warning: diagnostics disabled: {e}");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to start the async runtime")
        .map_err(|e| report_setup_error(&e))?;

    runtime.block_on(execute(&cli, &site))
}

async fn execute(cli: &Cli, site: &str) -> Result<(), i32> {
    let operation = cli.operation();
    let (mut ctx, recorder) =
        build_context(cli, site, &operation).map_err(|e| report_setup_error(&e))?;

    let token = Arc::clone(ctx.cancel_token());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, stopping after the current step (Ctrl-C again to abort)");
        token.cancel("interrupted by operator");
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(ErrorKind::Interrupted.exit_code());
        }
    });

    let span = run_span(&ctx, operation.name());
    let outcome = workflows::run(&operation, &mut ctx).instrument(span).await;

    print!("{}", render_report(&outcome.report));
    if let Some(recorder) = recorder {
        for command in recorder.commands() {
            println!("would run: {command}");
        }
    }

    match outcome.error {
        None => {
            if operation == Operation::Install && !cli.dry_run {
                print!("{}", render_credentials(&ctx));
            }
            if let Some(path) = ctx.log().path() {
                println!("run log: {}", path.display());
            }
            Ok(())
        }
        Some(error) => {
            eprintln!("error: {error}");
            if let Some(path) = ctx.log().path() {
                eprintln!("run log: {}", path.display());
            }
            Err(error.exit_code())
        }
    }
}

fn build_context(
    cli: &Cli,
    site: &str,
    operation: &Operation,
) -> anyhow::Result<(RunContext, Option<Arc<RecordingRunner>>)> {
    let config = ProvisionConfig::load(cli.config.as_deref()).map_err(ProvisionError::from)?;
    let site = SiteName::new(site)?;

    let fallback: Arc<dyn Prompter> = if cli.yes {
        Arc::new(AutoConfirmPrompter)
    } else {
        Arc::new(TerminalPrompter)
    };
    let prompter: Arc<dyn Prompter> = match &cli.answers {
        Some(path) => Arc::new(
            ScriptedPrompter::from_file(path)
                .map_err(ProvisionError::from)?
                .with_fallback(fallback),
        ),
        None => fallback,
    };

    let options = RunOptions {
        auto_confirm: cli.yes,
        dry_run: cli.dry_run,
    };
    let mut ctx = RunContext::new(site, Arc::new(config))
        .with_options(options)
        .with_prompter(prompter)
        .with_event_sink(Arc::new(LoggingEventSink::default()));

    if cli.dry_run {
        let recorder = Arc::new(RecordingRunner::new());
        ctx = ctx.with_runner(Arc::clone(&recorder) as _);
        return Ok((ctx, Some(recorder)));
    }

    let log_dir = ctx.paths().log_dir.clone();
    let log = RunLog::create(&log_dir, ctx.site().as_str(), operation.name())
        .with_context(|| format!("cannot create run log in {}", log_dir.display()))?;
    ctx = ctx.with_runner(Arc::new(SystemCommandRunner)).with_log(log);
    Ok((ctx, None))
}

fn report_setup_error(error: &anyhow::Error) -> i32 {
    eprintln!("error: {error:#}");
    exit_code(error)
}

/// Exit code of a setup failure: that of the first [`ProvisionError`] in
/// the chain, internal otherwise.
fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<ProvisionError>())
        .map_or(ErrorKind::Internal.exit_code(), ProvisionError::exit_code)
}

fn render_report(report: &RunReport) -> String {
    let width = report.steps.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for step in &report.steps {
        let tag = match step.status {
            StepStatus::Ok => "ok",
            StepStatus::Warned => "warn",
            StepStatus::Failed => "FAIL",
        };
        let detail = step.error.as_deref().or(step.note.as_deref()).unwrap_or("");
        let mut lines = detail.lines();
        let first = format!("[{tag:<4}] {:<width$}  {}", step.name, lines.next().unwrap_or(""));
        let _ = writeln!(out, "{}", first.trim_end());
        for line in lines {
            let _ = writeln!(out, "{:indent$}{line}", "", indent = width + 9);
        }
    }
    for rollback in &report.rollbacks {
        match &rollback.error {
            None => {
                let _ = writeln!(out, "[undo] {}", rollback.name);
            }
            Some(error) => {
                let _ = writeln!(out, "[undo] {}: failed: {error}", rollback.name);
            }
        }
    }
    out
}

fn render_credentials(ctx: &RunContext) -> String {
    let domain = ctx.site().domain(&ctx.config().site.domain_suffix);
    let credentials = ctx.credentials();
    let mut out = String::new();
    let _ = writeln!(out, "\nsite ready: http://{domain}");
    if let Some(admin) = &credentials.wp_admin {
        let _ = writeln!(
            out,
            "  WordPress admin: {} / {} ({})",
            admin.user,
            admin.password.expose(),
            admin.email
        );
    }
    if let Some(db) = &credentials.db_site {
        let _ = writeln!(
            out,
            "  database:        {} / {}",
            db.user,
            db.password.expose()
        );
    }
    out
}
