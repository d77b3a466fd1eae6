//! Command specifications and runners.

use crate::errors::ProvisionError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Where a command reads its standard input from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum Stdin {
    /// `/dev/null`.
    #[default]
    Null,
    /// Literal text, e.g. SQL statements.
    Text(String),
    /// The contents of a file, e.g. a database dump.
    File(PathBuf),
}

/// A command line plus its environment.
///
/// `Display` renders only the program and arguments; environment values
/// (which may carry passwords) are never rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    #[serde(skip)]
    pub env: Vec<(String, String)>,
    /// Standard input.
    pub stdin: Stdin,
    /// Working directory.
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: Stdin::Null,
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets standard input.
    #[must_use]
    pub fn stdin(mut self, stdin: Stdin) -> Self {
        self.stdin = stdin;
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Prefixes the command with `sudo` when `elevate` is set.
    ///
    /// Environment variables are forwarded by name with
    /// `--preserve-env`, so their values never appear on the command line.
    #[must_use]
    pub fn elevated(self, elevate: bool) -> Self {
        if !elevate {
            return self;
        }
        let mut args = Vec::with_capacity(self.args.len() + 2);
        if !self.env.is_empty() {
            let keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
            args.push(format!("--preserve-env={}", keys.join(",")));
        }
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
            env: self.env,
            stdin: self.stdin,
            current_dir: self.current_dir,
        }
    }

    /// Returns true if `needle` is the program or one of the arguments.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.program == needle || self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Exit code; `None` if killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    #[must_use]
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given exit code and stderr.
    #[must_use]
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Returns true if the command exited with status zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    /// Stdout and stderr joined, trimmed.
    #[must_use]
    pub fn combined(&self) -> String {
        let out = self.stdout.trim();
        let err = self.stderr.trim();
        match (out.is_empty(), err.is_empty()) {
            (true, true) => String::new(),
            (false, true) => out.to_string(),
            (true, false) => err.to_string(),
            (false, false) => format!("{out}\n{err}"),
        }
    }
}

/// Runs external commands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion and captures its output.
    ///
    /// A non-zero exit is not an error here; see [`run_checked`].
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProvisionError>;

    /// Returns true if `program` can be found on `PATH`.
    fn exists(&self, program: &str) -> bool;
}

/// Runs a command and turns a non-zero exit into
/// [`ProvisionError::CommandFailed`] carrying the captured output.
pub async fn run_checked(
    runner: &dyn CommandRunner,
    command: &CommandSpec,
) -> Result<CommandOutput, ProvisionError> {
    let output = runner.run(command).await?;
    if output.is_success() {
        Ok(output)
    } else {
        Err(ProvisionError::command_failed(
            command.to_string(),
            output.exit_code,
            output.combined(),
        ))
    }
}

/// Runs commands on the host with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        debug!(command = %command, "Running command");

        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        let input = match &command.stdin {
            Stdin::Null => {
                cmd.stdin(Stdio::null());
                None
            }
            Stdin::Text(text) => {
                cmd.stdin(Stdio::piped());
                Some(text.clone().into_bytes())
            }
            Stdin::File(path) => {
                let file = std::fs::File::open(path)?;
                cmd.stdin(Stdio::from(file));
                None
            }
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| ProvisionError::spawn_failed(command.to_string(), &e))?;

        if let Some(bytes) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(&bytes).await?;
                stdin.shutdown().await?;
            }
        }

        let output = child.wait_with_output().await?;
        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn exists(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Records commands instead of running them (dry runs).
///
/// Every command "succeeds" with empty output and every program "exists".
#[derive(Debug, Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandSpec>>,
}

impl RecordingRunner {
    /// Creates a new recording runner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands recorded so far.
    #[must_use]
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, ProvisionError> {
        tracing::info!(command = %command, "dry run: would execute");
        self.commands.lock().push(command.clone());
        Ok(CommandOutput::success(""))
    }

    fn exists(&self, _program: &str) -> bool {
        true
    }
}
