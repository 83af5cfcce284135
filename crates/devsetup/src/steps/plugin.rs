use super::{recover, Recovery, StepDeps};
use crate::ui;
use async_trait::async_trait;
use devsetup_core::command::CommandRunner;
use devsetup_core::context::{Context, ContextKey};
use devsetup_core::prompt::Prompt;
use devsetup_core::step::{CheckOutcome, Step, StepResult};
use std::sync::Arc;

/// Installs the Rojo plugin into Roblox Studio
pub struct PluginStep {
    sync_tool: String,
    runner: Arc<dyn CommandRunner>,
    prompt: Arc<dyn Prompt>,
}

impl PluginStep {
    pub fn new(deps: &StepDeps) -> Self {
        Self {
            sync_tool: deps.config.tools.sync_tool.clone(),
            runner: deps.runner.clone(),
            prompt: deps.prompt.clone(),
        }
    }
}

#[async_trait]
impl Step for PluginStep {
    fn name(&self) -> &str {
        "plugin"
    }

    fn title(&self) -> &str {
        "Rojo Studio plugin"
    }

    // Studio's plugin folder is not probed; only a recorded install counts
    async fn check(&self, ctx: &Context) -> Option<CheckOutcome> {
        ctx.flag(ContextKey::PluginInstalled)
            .then(CheckOutcome::skippable)
    }

    async fn run(&self, _ctx: &Context) -> anyhow::Result<StepResult> {
        let output = self
            .runner
            .run(
                &self.sync_tool,
                &["plugin".to_string(), "install".to_string()],
            )
            .await;
        if output.success() {
            ui::hint("Restart Roblox Studio if it is open so the plugin loads.");
            return Ok(StepResult::success_with(
                Context::new().with(ContextKey::PluginInstalled, true),
            ));
        }

        ui::warn(format!("`{} plugin install` failed", self.sync_tool));
        if !output.stderr.trim().is_empty() {
            ui::hint(output.stderr.trim());
        }
        ui::hint("Make sure Roblox Studio has been installed and opened at least once.");
        recover(
            self.prompt.as_ref(),
            Recovery::RetryOrQuit,
            "Studio plugin is not installed",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fixture;
    use super::*;
    use devsetup_core::attest::CHOICE_RETRY;
    use devsetup_core::command::CommandOutput;
    use devsetup_core::prompt::Answer;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_install_records_plugin() {
        let fx = fixture([], PathBuf::from("."));
        fx.runner.respond("rojo plugin install", CommandOutput::ok(""));
        let step = PluginStep::new(&fx.deps);

        assert!(step.check(&Context::new()).await.is_none());
        let result = step.run(&Context::new()).await.unwrap();
        assert!(result.data.unwrap().flag(ContextKey::PluginInstalled));

        let done = Context::new().with(ContextKey::PluginInstalled, true);
        assert!(step.check(&done).await.unwrap().allows_skip());
    }

    #[tokio::test]
    async fn test_failure_can_be_retried() {
        let fx = fixture([Answer::Select(CHOICE_RETRY.to_string())], PathBuf::from("."));
        fx.runner
            .respond("rojo plugin install", CommandOutput::failed(1, "Studio not found"));
        let step = PluginStep::new(&fx.deps);

        assert!(step.run(&Context::new()).await.unwrap().retry);
    }
}
