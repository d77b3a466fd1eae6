//! Pre-supplied answers.

use super::{parse_yes, unanswerable, Prompt, Prompter};
use crate::errors::{ConfigError, ProvisionError};
use crate::utils::Secret;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

/// One pre-supplied answer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    /// Reply to a yes/no question.
    Bool(bool),
    /// Reply to a text or secret question.
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnswerEntry {
    One(Answer),
    Many(Vec<Answer>),
}

/// Answers prompts from a queue per prompt key.
///
/// Each key holds a queue, so a retried question (a rejected password) gets
/// the next answer. Prompts with no queued answer go to the fallback
/// prompter when one is set, and are usage errors otherwise.
///
/// Answer files are TOML tables of prompt key to answer:
///
/// ```toml
/// "database.admin_password" = ["wrong", "right"]
/// "confirm.remove" = true
/// ```
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<HashMap<String, VecDeque<Answer>>>,
    asked: Mutex<Vec<String>>,
    fallback: Option<Arc<dyn Prompter>>,
}

impl ScriptedPrompter {
    /// Creates an empty prompter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads answers from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: HashMap<String, AnswerEntry> =
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.message().to_string(),
            })?;

        let prompter = Self::new();
        for (key, entry) in entries {
            match entry {
                AnswerEntry::One(answer) => prompter.push(&key, answer),
                AnswerEntry::Many(answers) => {
                    for answer in answers {
                        prompter.push(&key, answer);
                    }
                }
            }
        }
        Ok(prompter)
    }

    /// Queues an answer for `key`.
    pub fn push(&self, key: &str, answer: Answer) {
        self.answers
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(answer);
    }

    /// Queues a yes/no answer.
    #[must_use]
    pub fn with_confirm(self, key: &str, yes: bool) -> Self {
        self.push(key, Answer::Bool(yes));
        self
    }

    /// Queues a text answer.
    #[must_use]
    pub fn with_text(self, key: &str, text: impl Into<String>) -> Self {
        self.push(key, Answer::Text(text.into()));
        self
    }

    /// Sends unanswered prompts to `fallback`.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn Prompter>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Keys of every prompt asked so far, in order.
    #[must_use]
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }

    /// Number of answers not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.answers.lock().values().map(VecDeque::len).sum()
    }

    fn next(&self, prompt: &Prompt) -> Option<Answer> {
        self.asked.lock().push(prompt.key.clone());
        self.answers
            .lock()
            .get_mut(&prompt.key)
            .and_then(VecDeque::pop_front)
    }
}

impl std::fmt::Debug for ScriptedPrompter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPrompter")
            .field("remaining", &self.remaining())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, prompt: &Prompt) -> Result<bool, ProvisionError> {
        match self.next(prompt) {
            Some(Answer::Bool(yes)) => Ok(yes),
            Some(Answer::Text(text)) => Ok(parse_yes(&text)),
            None => match &self.fallback {
                Some(fallback) => fallback.confirm(prompt),
                // Unanswered confirmations are denials.
                None => Ok(false),
            },
        }
    }

    fn ask(&self, prompt: &Prompt) -> Result<String, ProvisionError> {
        match self.next(prompt) {
            Some(Answer::Text(text)) => Ok(text),
            Some(Answer::Bool(_)) => Err(ProvisionError::Usage(format!(
                "answer for prompt '{}' must be text",
                prompt.key
            ))),
            None => match &self.fallback {
                Some(fallback) => fallback.ask(prompt),
                None => prompt.default.clone().ok_or_else(|| unanswerable(prompt)),
            },
        }
    }

    fn ask_secret(&self, prompt: &Prompt) -> Result<Secret, ProvisionError> {
        match self.next(prompt) {
            Some(Answer::Text(text)) => Ok(Secret::new(text)),
            Some(Answer::Bool(_)) => Err(ProvisionError::Usage(format!(
                "answer for prompt '{}' must be text",
                prompt.key
            ))),
            None => match &self.fallback {
                Some(fallback) => fallback.ask_secret(prompt),
                None => Err(unanswerable(prompt)),
            },
        }
    }
}
