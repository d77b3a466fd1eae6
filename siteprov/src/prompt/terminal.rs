//! Interactive prompts on the controlling terminal.

use super::{parse_yes, Prompt, Prompter};
use crate::errors::ProvisionError;
use crate::utils::Secret;
use std::io::{self, BufRead, Write};
use std::process::{Command, Stdio};

/// Reads answers from stdin, writing questions to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn read_line(question: &str) -> Result<String, ProvisionError> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{question} ")?;
        stderr.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(ProvisionError::Interrupted("end of input at prompt".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn set_echo(enabled: bool) {
        let flag = if enabled { "echo" } else { "-echo" };
        // Not a terminal, or no stty: the answer is read with echo.
        let _ = Command::new("stty")
            .arg(flag)
            .stdin(Stdio::inherit())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, prompt: &Prompt) -> Result<bool, ProvisionError> {
        let reply = Self::read_line(&format!("{} [y/N]", prompt.text))?;
        Ok(parse_yes(&reply))
    }

    fn ask(&self, prompt: &Prompt) -> Result<String, ProvisionError> {
        let question = match &prompt.default {
            Some(default) => format!("{} [{default}]:", prompt.text),
            None => format!("{}:", prompt.text),
        };
        let reply = Self::read_line(&question)?;
        match (&prompt.default, reply.trim()) {
            (Some(default), "") => Ok(default.clone()),
            (_, reply) => Ok(reply.to_string()),
        }
    }

    fn ask_secret(&self, prompt: &Prompt) -> Result<Secret, ProvisionError> {
        Self::set_echo(false);
        let reply = Self::read_line(&format!("{}:", prompt.text));
        Self::set_echo(true);
        eprintln!();
        reply.map(Secret::from)
    }
}
