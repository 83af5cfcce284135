//! Interactive prompt capability
//!
//! Steps and the engine ask the user questions through the [`Prompt`] trait.
//! [`TerminalPrompt`] talks to a real terminal; [`ScriptedPrompt`] replays
//! canned answers so tests (and human-attestation steps under test) are
//! deterministic.

use crate::errors::PromptError;
use async_trait::async_trait;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Validator for free-text input; `Err` carries the message shown to the user
pub type InputValidator = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// One option of a select prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Stable identifier returned by [`Prompt::select`]
    pub id: String,
    /// Text shown to the user
    pub label: String,
}

impl Choice {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Request/response prompt capability
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Yes/no question
    async fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError>;

    /// Pick one of `choices`; returns the chosen [`Choice::id`]
    async fn select(&self, message: &str, choices: &[Choice]) -> Result<String, PromptError>;

    /// Free text with an optional default and validator
    async fn input(
        &self,
        message: &str,
        default: Option<&str>,
        validator: Option<InputValidator>,
    ) -> Result<String, PromptError>;
}

/// Prompts on the controlling terminal
#[derive(Debug, Default, Clone)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

fn terminal_error(err: impl std::fmt::Display) -> PromptError {
    PromptError::Terminal {
        message: err.to_string(),
    }
}

// Raw-mode prompts read Ctrl+C as a key and report it as an interrupted read
fn dialog_error(err: dialoguer::Error) -> PromptError {
    match err {
        dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
            PromptError::Interrupted
        }
        other => terminal_error(other),
    }
}

#[async_trait]
impl Prompt for TerminalPrompt {
    async fn confirm(&self, message: &str, default: bool) -> Result<bool, PromptError> {
        let message = message.to_string();
        tokio::task::spawn_blocking(move || {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(message)
                .default(default)
                .interact()
                .map_err(dialog_error)
        })
        .await
        .map_err(terminal_error)?
    }

    async fn select(&self, message: &str, choices: &[Choice]) -> Result<String, PromptError> {
        if choices.is_empty() {
            return Err(PromptError::NoChoices {
                message: message.to_string(),
            });
        }
        let message = message.to_string();
        let labels: Vec<String> = choices.iter().map(|c| c.label.clone()).collect();
        let index = tokio::task::spawn_blocking(move || {
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(message)
                .items(&labels)
                .default(0)
                .interact()
                .map_err(dialog_error)
        })
        .await
        .map_err(terminal_error)??;

        Ok(choices[index].id.clone())
    }

    async fn input(
        &self,
        message: &str,
        default: Option<&str>,
        validator: Option<InputValidator>,
    ) -> Result<String, PromptError> {
        let message = message.to_string();
        let default = default.map(str::to_string);
        tokio::task::spawn_blocking(move || {
            let theme = ColorfulTheme::default();
            let mut input = Input::<String>::with_theme(&theme).with_prompt(message);
            if let Some(default) = default {
                input = input.default(default);
            }
            if let Some(validator) = validator {
                input = input.validate_with(move |value: &String| validator(value));
            }
            input.interact_text().map_err(dialog_error)
        })
        .await
        .map_err(terminal_error)?
    }
}

/// A canned answer for [`ScriptedPrompt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Confirm(bool),
    /// Choice id
    Select(String),
    /// Text; `Input(None)` accepts the default
    Input(Option<String>),
}

/// Replays answers in order and records every question asked
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Answer>>,
    asked: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            asked: Mutex::new(Vec::new()),
        }
    }

    /// Messages of every prompt shown so far
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|a| a.len()).unwrap_or(0)
    }

    fn next(&self, message: &str) -> Result<Answer, PromptError> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(message.to_string());
        }
        let answer = self
            .answers
            .lock()
            .ok()
            .and_then(|mut answers| answers.pop_front());
        debug!(prompt = message, ?answer, "Scripted prompt answered");
        answer.ok_or_else(|| PromptError::Exhausted {
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn confirm(&self, message: &str, _default: bool) -> Result<bool, PromptError> {
        match self.next(message)? {
            Answer::Confirm(value) => Ok(value),
            _ => Err(PromptError::UnexpectedAnswer {
                message: message.to_string(),
                expected: "confirm",
            }),
        }
    }

    async fn select(&self, message: &str, choices: &[Choice]) -> Result<String, PromptError> {
        if choices.is_empty() {
            return Err(PromptError::NoChoices {
                message: message.to_string(),
            });
        }
        match self.next(message)? {
            Answer::Select(id) if choices.iter().any(|c| c.id == id) => Ok(id),
            _ => Err(PromptError::UnexpectedAnswer {
                message: message.to_string(),
                expected: "select",
            }),
        }
    }

    /// Invalid answers are rejected the way a terminal re-prompts: the next
    /// scripted answer is tried.
    async fn input(
        &self,
        message: &str,
        default: Option<&str>,
        validator: Option<InputValidator>,
    ) -> Result<String, PromptError> {
        loop {
            let value = match self.next(message)? {
                Answer::Input(Some(text)) => text,
                Answer::Input(None) => default.unwrap_or_default().to_string(),
                _ => {
                    return Err(PromptError::UnexpectedAnswer {
                        message: message.to_string(),
                        expected: "input",
                    })
                }
            };
            match &validator {
                Some(validate) => match validate(&value) {
                    Ok(()) => return Ok(value),
                    Err(reason) => debug!(%reason, "Scripted input rejected by validator"),
                },
                None => return Ok(value),
            }
        }
    }
}
