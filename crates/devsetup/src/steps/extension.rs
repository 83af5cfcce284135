use super::{recover, Recovery, StepDeps};
use crate::ui;
use async_trait::async_trait;
use devsetup_core::command::CommandRunner;
use devsetup_core::context::{Context, ContextKey};
use devsetup_core::prompt::Prompt;
use devsetup_core::step::{CheckOutcome, Step, StepResult, Verification};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Installs the Rojo extension into the editor
pub struct ExtensionStep {
    editor: String,
    extension_id: String,
    runner: Arc<dyn CommandRunner>,
    prompt: Arc<dyn Prompt>,
}

impl ExtensionStep {
    pub fn new(deps: &StepDeps) -> Self {
        Self {
            editor: deps.config.tools.editor.clone(),
            extension_id: deps.config.extension_id.clone(),
            runner: deps.runner.clone(),
            prompt: deps.prompt.clone(),
        }
    }

    /// `None` when the editor could not list its extensions
    async fn is_listed(&self) -> Option<bool> {
        let output = self
            .runner
            .run(&self.editor, &["--list-extensions".to_string()])
            .await;
        if !output.success() {
            return None;
        }
        Some(
            output
                .stdout
                .lines()
                .any(|line| line.trim().eq_ignore_ascii_case(&self.extension_id)),
        )
    }

    fn installed() -> StepResult {
        StepResult::success_with(Context::new().with(ContextKey::ExtensionInstalled, true))
    }
}

#[async_trait]
impl Step for ExtensionStep {
    fn name(&self) -> &str {
        "extension"
    }

    fn title(&self) -> &str {
        "Rojo editor extension"
    }

    async fn check(&self, ctx: &Context) -> Option<CheckOutcome> {
        let found = self.is_listed().await.unwrap_or(false);
        Some(CheckOutcome {
            found,
            can_skip: found && ctx.flag(ContextKey::ExtensionInstalled),
        })
    }

    async fn verify(&self, _ctx: &Context) -> Option<Verification> {
        Some(match self.is_listed().await {
            Some(true) => Verification::ok(),
            Some(false) => Verification::failed(vec![format!(
                "extension {} is not installed",
                self.extension_id
            )]),
            None => Verification::failed(vec![format!(
                "`{} --list-extensions` failed",
                self.editor
            )]),
        })
    }

    #[instrument(skip_all, fields(extension = %self.extension_id))]
    async fn run(&self, _ctx: &Context) -> anyhow::Result<StepResult> {
        match self.is_listed().await {
            Some(true) => {
                debug!("Extension already installed");
                return Ok(Self::installed());
            }
            Some(false) => {}
            None => {
                ui::warn(format!("Could not ask `{}` for its extensions", self.editor));
                return recover(
                    self.prompt.as_ref(),
                    Recovery::RetrySkipOrQuit,
                    "editor extensions could not be listed",
                )
                .await;
            }
        }

        ui::say(format!("Installing {}…", self.extension_id));
        let output = self
            .runner
            .run(
                &self.editor,
                &["--install-extension".to_string(), self.extension_id.clone()],
            )
            .await;
        if output.success() {
            return Ok(Self::installed());
        }

        ui::warn(format!("Installing {} failed", self.extension_id));
        if !output.stderr.trim().is_empty() {
            ui::hint(output.stderr.trim());
        }
        ui::hint("You can also install it from the Extensions view in the editor.");
        recover(
            self.prompt.as_ref(),
            Recovery::RetrySkipOrQuit,
            "editor extension is not installed",
        )
        .await
    }
}
