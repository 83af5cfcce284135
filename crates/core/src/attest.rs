//! Human attestation steps
//!
//! Some outcomes can only be judged by the user ("Is the plugin connected?").
//! Those steps ask a yes/no question and let a "no" choose between trying
//! again, skipping, or quitting. The answer comes from the [`Prompt`]
//! capability, so a test harness can inject it.

use crate::context::Context;
use crate::errors::PromptError;
use crate::prompt::{Choice, Prompt};
use crate::step::{Step, StepKind, StepResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Choice id for "try again"
pub const CHOICE_RETRY: &str = "retry";
/// Choice id for "skip this step"
pub const CHOICE_SKIP: &str = "skip";
/// Choice id for "quit setup"
pub const CHOICE_QUIT: &str = "quit";

fn follow_up_choices() -> [Choice; 3] {
    [
        Choice::new(CHOICE_RETRY, "Try again"),
        Choice::new(CHOICE_SKIP, "Skip this step"),
        Choice::new(CHOICE_QUIT, "Quit setup"),
    ]
}

/// Ask `question` and turn the answer into a step result.
///
/// Yes is success. No leads to a follow-up select mapped to `retry`,
/// `skipped` or `fatal`.
#[instrument(level = "debug", skip(prompt))]
pub async fn await_attestation(
    prompt: &dyn Prompt,
    question: &str,
) -> Result<StepResult, PromptError> {
    if prompt.confirm(question, true).await? {
        debug!("Attested");
        return Ok(StepResult::success());
    }

    let choice = prompt
        .select("What would you like to do?", &follow_up_choices())
        .await?;
    debug!(%choice, "Attestation declined");
    Ok(match choice.as_str() {
        CHOICE_RETRY => StepResult::retry("user asked to try again"),
        CHOICE_SKIP => StepResult::skipped("skipped by user"),
        _ => StepResult::fatal(format!("user quit at: {}", question)),
    })
}

/// A step whose whole body is one attestation question
pub struct AttestationStep {
    name: String,
    title: String,
    question: String,
    prompt: Arc<dyn Prompt>,
    on_success: Option<Context>,
}

impl AttestationStep {
    pub fn new(
        name: impl Into<String>,
        question: impl Into<String>,
        prompt: Arc<dyn Prompt>,
    ) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            question: question.into(),
            prompt,
            on_success: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Context merged when the user confirms
    pub fn with_data(mut self, data: Context) -> Self {
        self.on_success = Some(data);
        self
    }
}

#[async_trait]
impl Step for AttestationStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn kind(&self) -> StepKind {
        StepKind::Attestation
    }

    async fn run(&self, _ctx: &Context) -> anyhow::Result<StepResult> {
        let result = await_attestation(self.prompt.as_ref(), &self.question).await?;
        Ok(match (&self.on_success, result.success && !result.skip) {
            (Some(data), true) => result.with_data(data.clone()),
            _ => result,
        })
    }
}
