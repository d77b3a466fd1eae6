//! A command runner driven by canned responses.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;

use crate::errors::ProvisionError;
use crate::system::{CommandOutput, CommandRunner, CommandSpec, Stdin};

/// Answers commands from a list of rules and records everything it is
/// asked to run.
///
/// A rule matches when its needle occurs in the rendered command line; the
/// first matching rule wins. Rules on the SQL fed through stdin are checked
/// before rules on the command line. Unmatched commands succeed with empty
/// output.
/// Every program exists unless marked missing.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    stdin_rules: Mutex<Vec<(String, CommandOutput)>>,
    commands: Mutex<Vec<CommandSpec>>,
    missing: Mutex<HashSet<String>>,
}

impl ScriptedRunner {
    /// Creates a runner where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers commands containing `needle` with `output`.
    #[must_use]
    pub fn with_rule(self, needle: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.lock().push((needle.into(), output));
        self
    }

    /// Fails commands containing `needle` with `exit_code` and `stderr`.
    #[must_use]
    pub fn failing(
        self,
        needle: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        self.with_rule(needle, CommandOutput::failure(exit_code, stderr))
    }

    /// Answers commands containing `needle` with `stdout`.
    #[must_use]
    pub fn replying(self, needle: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.with_rule(needle, CommandOutput::success(stdout))
    }

    /// Answers commands whose stdin text contains `needle` with `output`.
    #[must_use]
    pub fn on_stdin(self, needle: impl Into<String>, output: CommandOutput) -> Self {
        self.stdin_rules.lock().push((needle.into(), output));
        self
    }

    /// Reports `program` as not installed.
    #[must_use]
    pub fn without(self, program: impl Into<String>) -> Self {
        self.missing.lock().insert(program.into());
        self
    }

    /// Marks `program` as installed again.
    pub fn install(&self, program: &str) {
        self.missing.lock().remove(program);
    }

    /// Commands run so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().clone()
    }

    /// Rendered command lines run so far, in order.
    #[must_use]
    pub fn command_lines(&self) -> Vec<String> {
        self.commands.lock().iter().map(ToString::to_string).collect()
    }

    /// Returns true if a command containing `needle` was run.
    #[must_use]
    pub fn ran(&self, needle: &str) -> bool {
        self.commands.lock().iter().any(|c| c.mentions(needle) || c.to_string().contains(needle))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        self.commands.lock().push(command.clone());
        let by_stdin = match &command.stdin {
            Stdin::Text(text) => first_match(&self.stdin_rules, text),
            _ => None,
        };
        let output = by_stdin
            .or_else(|| first_match(&self.rules, &command.to_string()))
            .unwrap_or_else(|| CommandOutput::success(""));
        Ok(output)
    }

    fn exists(&self, program: &str) -> bool {
        !self.missing.lock().contains(program)
    }
}

fn first_match(
    rules: &Mutex<Vec<(String, CommandOutput)>>,
    haystack: &str,
) -> Option<CommandOutput> {
    rules
        .lock()
        .iter()
        .find(|(needle, _)| haystack.contains(needle.as_str()))
        .map(|(_, output)| output.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new()
            .failing("nginx -t", 1, "emerg")
            .replying("nginx", "ok");

        let out = runner.run(&CommandSpec::new("nginx").arg("-t")).await.unwrap();
        assert_eq!(out.exit_code, Some(1));
        let out = runner.run(&CommandSpec::new("nginx").arg("-v")).await.unwrap();
        assert_eq!(out.stdout, "ok");
        let out = runner.run(&CommandSpec::new("tar")).await.unwrap();
        assert!(out.is_success());

        assert_eq!(runner.command_lines(), vec!["nginx -t", "nginx -v", "tar"]);
        assert!(runner.ran("-v"));
    }

    #[tokio::test]
    async fn test_stdin_rules_come_first() {
        let runner = ScriptedRunner::new()
            .replying("mariadb", "wp_blog")
            .on_stdin("CREATE USER", CommandOutput::failure(1, "ERROR 1396"));

        let create = CommandSpec::new("mariadb").stdin(Stdin::Text("CREATE USER 'x';".into()));
        assert_eq!(runner.run(&create).await.unwrap().exit_code, Some(1));
        let query = CommandSpec::new("mariadb").stdin(Stdin::Text("SELECT 1;".into()));
        assert_eq!(runner.run(&query).await.unwrap().stdout, "wp_blog");
    }

    #[test]
    fn test_missing_programs() {
        let runner = ScriptedRunner::new().without("wp");
        assert!(!runner.exists("wp"));
        assert!(runner.exists("nginx"));
        runner.install("wp");
        assert!(runner.exists("wp"));
    }
}
