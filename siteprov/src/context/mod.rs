//! The mutable state threaded through one provisioning run.
//!
//! A [`RunContext`] is created once per run and passed by `&mut` to every
//! step and rollback handler in turn. It owns the run log, the credentials
//! gathered so far and any values generated by earlier steps, and holds
//! shared handles to the collaborators a step talks to.

mod credentials;
mod site;

pub use credentials::{Credentials, DbLogin, WpAdmin};
pub use site::{SiteName, SitePaths, MAX_SITE_NAME_LEN};

use crate::cancellation::CancellationToken;
use crate::config::ProvisionConfig;
use crate::errors::ProvisionError;
use crate::events::{EventSink, NoOpEventSink};
use crate::prompt::{Prompt, Prompter, TerminalPrompter};
use crate::runlog::{LogLevel, LogRecord, RunLog};
use crate::system::{self, CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
use crate::utils::{now_utc, Timestamp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Identifies one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunIdentity {
    /// Unique run ID.
    pub run_id: Uuid,
    /// When the context was created.
    pub started_at: Timestamp,
}

impl RunIdentity {
    /// Creates a new identity with a generated run ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: now_utc(),
        }
    }
}

impl Default for RunIdentity {
    fn default() -> Self {
        Self::new()
    }
}

/// Switches that change how a run treats the outside world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    /// Treat every confirmation as granted.
    pub auto_confirm: bool,
    /// Record commands and describe filesystem changes instead of making them.
    pub dry_run: bool,
}

/// Mutable state for one orchestration run.
pub struct RunContext {
    identity: RunIdentity,
    site: SiteName,
    paths: SitePaths,
    config: Arc<ProvisionConfig>,
    options: RunOptions,
    credentials: Credentials,
    values: BTreeMap<String, String>,
    runner: Arc<dyn CommandRunner>,
    prompter: Arc<dyn Prompter>,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    log: RunLog,
}

impl RunContext {
    /// Creates a context that runs real commands and prompts on the terminal.
    #[must_use]
    pub fn new(site: SiteName, config: Arc<ProvisionConfig>) -> Self {
        let paths = SitePaths::resolve(&config, &site);
        Self {
            identity: RunIdentity::new(),
            site,
            paths,
            config,
            options: RunOptions::default(),
            credentials: Credentials::default(),
            values: BTreeMap::new(),
            runner: Arc::new(SystemCommandRunner),
            prompter: Arc::new(TerminalPrompter),
            events: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
            log: RunLog::in_memory(),
        }
    }

    /// Sets the command runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Sets the prompter.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Sets the run log.
    #[must_use]
    pub fn with_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    /// Sets the run options.
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancel_token(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the run identity.
    #[must_use]
    pub const fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    /// Returns the site name.
    #[must_use]
    pub const fn site(&self) -> &SiteName {
        &self.site
    }

    /// Returns the resolved paths.
    #[must_use]
    pub const fn paths(&self) -> &SitePaths {
        &self.paths
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Returns the run options.
    #[must_use]
    pub const fn options(&self) -> RunOptions {
        self.options
    }

    /// Returns true in dry-run mode.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    /// Returns the command runner.
    #[must_use]
    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    /// Returns the prompter.
    #[must_use]
    pub fn prompter(&self) -> Arc<dyn Prompter> {
        Arc::clone(&self.prompter)
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn cancel_token(&self) -> &Arc<CancellationToken> {
        &self.cancel
    }

    /// Returns the run log.
    #[must_use]
    pub const fn log(&self) -> &RunLog {
        &self.log
    }

    /// Returns the credentials gathered so far.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the credentials for modification.
    pub fn credentials_mut(&mut self) -> &mut Credentials {
        &mut self.credentials
    }

    /// Stores a value for later steps.
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Returns a value stored by an earlier step.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns a value stored by an earlier step, or an error naming it.
    pub fn require_value(&self, key: &str) -> Result<&str, ProvisionError> {
        self.value(key)
            .ok_or_else(|| ProvisionError::step("context", format!("no value stored for '{key}'")))
    }

    /// Returns all stored values.
    #[must_use]
    pub const fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Appends a record to the run log and mirrors it to tracing.
    ///
    /// A failed write is reported through tracing; the record is kept in
    /// memory either way.
    pub fn record(&mut self, level: LogLevel, message: impl Into<String>) {
        let record = LogRecord::new(level, message);
        match level {
            LogLevel::Info | LogLevel::Ok => {
                info!(site = %self.site, level = %level, "{}", record.message);
            }
            LogLevel::Warn => warn!(site = %self.site, "{}", record.message),
            LogLevel::Error => error!(site = %self.site, "{}", record.message),
        }
        if let Err(e) = self.log.append(record) {
            warn!(error = %e, "Failed to write run log");
        }
    }

    /// Asks the operator to confirm an action.
    ///
    /// Granted immediately with auto-confirm or in dry-run mode. Anything but
    /// an explicit yes is a [`ProvisionError::ConfirmationDenied`].
    pub fn confirm(&self, prompt: &Prompt) -> Result<(), ProvisionError> {
        if self.options.auto_confirm || self.options.dry_run {
            return Ok(());
        }
        if self.prompter.confirm(prompt)? {
            Ok(())
        } else {
            Err(ProvisionError::confirmation_denied(prompt.text.clone()))
        }
    }

    /// Prefixes `command` with `sudo` when configured.
    #[must_use]
    pub fn privileged(&self, command: CommandSpec) -> CommandSpec {
        command.elevated(self.config.system.sudo)
    }

    /// Runs a command, returning its output whatever the exit status.
    pub async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        let runner = self.runner();
        runner.run(command).await
    }

    /// Runs a command, failing on a non-zero exit.
    pub async fn run_checked(
        &self,
        command: &CommandSpec,
    ) -> Result<CommandOutput, ProvisionError> {
        let runner = self.runner();
        system::run_checked(runner.as_ref(), command).await
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.identity.run_id)
            .field("site", &self.site)
            .field("options", &self.options)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("records", &self.log.records().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;
    use crate::system::MockCommandRunner;
    use crate::testing::test_context;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_values() {
        let mut ctx = test_context("blog");
        assert!(ctx.value("db.name").is_none());
        assert!(ctx.require_value("db.name").is_err());
        ctx.set_value("db.name", "wp_blog");
        assert_eq!(ctx.require_value("db.name").unwrap(), "wp_blog");
    }

    #[test]
    fn test_record_appends() {
        let mut ctx = test_context("blog");
        ctx.record(LogLevel::Ok, "step create-dir: ok");
        ctx.record(LogLevel::Error, "line one\nline two");
        let records = ctx.log().records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].message, "line one | line two");
    }

    #[test]
    fn test_confirm_denied_by_default() {
        let ctx = test_context("blog").with_prompter(Arc::new(ScriptedPrompter::new()));
        let err = ctx
            .confirm(&Prompt::new("confirm.remove", "Remove site blog?"))
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ConfirmationDenied { .. }));
    }

    #[test]
    fn test_confirm_granted() {
        let prompter = ScriptedPrompter::new().with_confirm("confirm.remove", true);
        let ctx = test_context("blog").with_prompter(Arc::new(prompter));
        assert!(ctx.confirm(&Prompt::new("confirm.remove", "Remove?")).is_ok());
    }

    #[test]
    fn test_confirm_auto_and_dry_run() {
        let ctx = test_context("blog")
            .with_prompter(Arc::new(ScriptedPrompter::new()))
            .with_options(RunOptions {
                auto_confirm: true,
                dry_run: false,
            });
        assert!(ctx.confirm(&Prompt::new("k", "?")).is_ok());

        let ctx = test_context("blog")
            .with_prompter(Arc::new(ScriptedPrompter::new()))
            .with_options(RunOptions {
                auto_confirm: false,
                dry_run: true,
            });
        assert!(ctx.confirm(&Prompt::new("k", "?")).is_ok());
    }

    #[test]
    fn test_privileged_follows_config() {
        let ctx = test_context("blog");
        // test contexts are rooted in a scratch dir with sudo disabled
        let cmd = ctx.privileged(CommandSpec::new("systemctl"));
        assert_eq!(cmd.program, "systemctl");

        let mut config = ProvisionConfig::default();
        config.system.sudo = true;
        let ctx = RunContext::new(SiteName::new("blog").unwrap(), Arc::new(config));
        assert_eq!(ctx.privileged(CommandSpec::new("systemctl")).program, "sudo");
    }

    #[tokio::test]
    async fn test_run_checked_uses_runner() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd| cmd.program == "nginx")
            .times(1)
            .returning(|_| Ok(CommandOutput::success("syntax is ok")));
        let ctx = test_context("blog").with_runner(Arc::new(runner));
        let out = ctx.run_checked(&CommandSpec::new("nginx").arg("-t")).await.unwrap();
        assert_eq!(out.stdout, "syntax is ok");
    }
}
