use crate::ui;
use async_trait::async_trait;
use console::style;
use devsetup_core::context::Context;
use devsetup_core::prompt::Prompt;
use devsetup_core::step::{Step, StepResult};
use std::sync::Arc;

const JOURNEY: &[&str] = &[
    "Visual Studio Code, the editor you will write Luau in",
    "Aftman, which installs and pins your command-line tools",
    "Rojo, which syncs files on disk into Roblox Studio",
    "The Rojo editor extension and Studio plugin",
    "A new Rojo project, served live to Studio",
];

/// Explains what is about to happen and asks to start
pub struct WelcomeStep {
    prompt: Arc<dyn Prompt>,
}

impl WelcomeStep {
    pub fn new(prompt: Arc<dyn Prompt>) -> Self {
        Self { prompt }
    }
}

#[async_trait]
impl Step for WelcomeStep {
    fn name(&self) -> &str {
        "welcome"
    }

    fn title(&self) -> &str {
        "Welcome"
    }

    async fn run(&self, _ctx: &Context) -> anyhow::Result<StepResult> {
        ui::say(style("This wizard sets up Roblox development with:").bold().to_string());
        for item in JOURNEY {
            ui::say(format!("  • {}", item));
        }
        ui::hint("Progress is saved after every step; quit any time and run devsetup again to resume.");

        if self.prompt.confirm("Ready to start?", true).await? {
            Ok(StepResult::success())
        } else {
            Ok(StepResult::fatal("setup declined"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devsetup_core::prompt::{Answer, ScriptedPrompt};

    #[tokio::test]
    async fn test_accepting_starts_setup() {
        let step = WelcomeStep::new(Arc::new(ScriptedPrompt::new([Answer::Confirm(true)])));
        let result = step.run(&Context::new()).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_declining_is_fatal() {
        let step = WelcomeStep::new(Arc::new(ScriptedPrompt::new([Answer::Confirm(false)])));
        let result = step.run(&Context::new()).await.unwrap();
        assert!(!result.success && !result.retry);
        assert_eq!(result.message.as_deref(), Some("setup declined"));
    }
}
