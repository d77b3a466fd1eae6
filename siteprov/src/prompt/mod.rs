//! Operator prompts.
//!
//! Every question has a stable key (`confirm.remove`, `database.admin_password`)
//! so unattended runs can answer it from a file instead of a terminal.

mod retry;
mod scripted;
mod terminal;

pub use retry::with_auth_retry;
pub use scripted::{Answer, ScriptedPrompter};
pub use terminal::TerminalPrompter;

use crate::errors::ProvisionError;
use crate::utils::Secret;

/// A question put to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Stable identifier, used to look up pre-supplied answers.
    pub key: String,
    /// Text shown to the operator.
    pub text: String,
    /// Value used when the operator just presses enter.
    pub default: Option<String>,
}

impl Prompt {
    /// Creates a prompt with no default.
    #[must_use]
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            default: None,
        }
    }

    /// Sets the default answer.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Source of operator answers.
pub trait Prompter: Send + Sync {
    /// Asks a yes/no question. Anything but an explicit yes is a no.
    fn confirm(&self, prompt: &Prompt) -> Result<bool, ProvisionError>;

    /// Asks for a line of text.
    fn ask(&self, prompt: &Prompt) -> Result<String, ProvisionError>;

    /// Asks for a secret without echoing it.
    fn ask_secret(&self, prompt: &Prompt) -> Result<Secret, ProvisionError>;
}

/// Answers yes to every confirmation and takes every default.
///
/// Used with `--yes`. Questions without a default cannot be answered and
/// are reported as usage errors so unattended runs fail fast.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirmPrompter;

impl Prompter for AutoConfirmPrompter {
    fn confirm(&self, _prompt: &Prompt) -> Result<bool, ProvisionError> {
        Ok(true)
    }

    fn ask(&self, prompt: &Prompt) -> Result<String, ProvisionError> {
        prompt.default.clone().ok_or_else(|| unanswerable(prompt))
    }

    fn ask_secret(&self, prompt: &Prompt) -> Result<Secret, ProvisionError> {
        Err(unanswerable(prompt))
    }
}

pub(crate) fn unanswerable(prompt: &Prompt) -> ProvisionError {
    ProvisionError::Usage(format!(
        "no answer for prompt '{}' in non-interactive mode (supply it with --answers)",
        prompt.key
    ))
}

/// Interprets a typed reply to a yes/no question.
pub(crate) fn parse_yes(reply: &str) -> bool {
    matches!(reply.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yes() {
        assert!(parse_yes("y"));
        assert!(parse_yes(" YES\n"));
        assert!(!parse_yes(""));
        assert!(!parse_yes("n"));
        assert!(!parse_yes("sure"));
    }

    #[test]
    fn test_auto_confirm() {
        let prompter = AutoConfirmPrompter;
        assert!(prompter.confirm(&Prompt::new("confirm.remove", "Remove?")).unwrap());
        assert_eq!(
            prompter
                .ask(&Prompt::new("site.title", "Title").with_default("blog"))
                .unwrap(),
            "blog"
        );
        let err = prompter
            .ask_secret(&Prompt::new("database.admin_password", "Password"))
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("database.admin_password"));
    }
}
