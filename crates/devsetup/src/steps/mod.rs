//! Concrete wizard steps
//!
//! The pipeline walks a new developer from an empty machine to a Studio
//! session synced with a Rojo project. Every step talks to the outside world
//! through the capabilities in [`StepDeps`], so each one can be exercised with
//! a scripted prompt and a mock command runner.

pub mod connect;
pub mod extension;
pub mod plugin;
pub mod project;
pub mod server;
pub mod tools;
pub mod welcome;

use anyhow::Result;
use devsetup_core::attest::{CHOICE_QUIT, CHOICE_RETRY, CHOICE_SKIP};
use devsetup_core::command::CommandRunner;
use devsetup_core::config::WizardConfig;
use devsetup_core::prompt::{Choice, Prompt};
use devsetup_core::step::{Step, StepResult};
use std::path::PathBuf;
use std::sync::Arc;

pub use server::SyncServer;

/// Capabilities shared by the built-in steps
#[derive(Clone)]
pub struct StepDeps {
    pub config: WizardConfig,
    pub prompt: Arc<dyn Prompt>,
    pub runner: Arc<dyn CommandRunner>,
    pub server: Arc<SyncServer>,
    /// Base directory for new projects when `projects_dir` is unset
    pub working_dir: PathBuf,
}

impl StepDeps {
    pub fn projects_dir(&self) -> PathBuf {
        self.config
            .projects_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.clone())
    }
}

/// The full setup pipeline, in order
pub fn build_pipeline(deps: &StepDeps) -> Vec<Box<dyn Step>> {
    vec![
        Box::new(welcome::WelcomeStep::new(deps.prompt.clone())),
        Box::new(tools::ToolStep::editor(deps)),
        Box::new(tools::ToolStep::toolchain(deps)),
        Box::new(tools::ToolStep::sync_tool(deps)),
        Box::new(extension::ExtensionStep::new(deps)),
        Box::new(project::ProjectStep::new(deps)),
        Box::new(plugin::PluginStep::new(deps)),
        Box::new(server::SyncServerStep::new(deps)),
        Box::new(connect::ConnectStep::new(deps)),
    ]
}

/// What a failed step offers besides trying again and quitting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Recovery {
    RetryOrQuit,
    RetrySkipOrQuit,
}

/// Ask how to continue after a step could not finish on its own.
///
/// Maps "Check again" to a retry, "Skip" to a skipped success and "Quit" to a
/// fatal result carrying `reason`.
pub(crate) async fn recover(
    prompt: &dyn Prompt,
    recovery: Recovery,
    reason: &str,
) -> Result<StepResult> {
    let mut choices = vec![Choice::new(CHOICE_RETRY, "Check again")];
    if recovery == Recovery::RetrySkipOrQuit {
        choices.push(Choice::new(CHOICE_SKIP, "Skip this step"));
    }
    choices.push(Choice::new(CHOICE_QUIT, "Quit setup"));

    let choice = prompt.select("What would you like to do?", &choices).await?;
    Ok(match choice.as_str() {
        CHOICE_RETRY => StepResult::retry(reason),
        CHOICE_SKIP => StepResult::skipped("skipped by user"),
        _ => StepResult::fatal(reason),
    })
}

/// Version from the first line of `--version` output ("Rojo 7.4.0" -> "7.4.0")
pub(crate) fn parse_version(first_line: &str) -> Option<String> {
    first_line
        .split_whitespace()
        .last()
        .map(|token| token.trim_start_matches('v').to_string())
}


#[cfg(test)]
mod tests {
    use super::test_support::fixture;
    use super::*;
    use devsetup_core::prompt::{Answer, ScriptedPrompt};
    use devsetup_core::step::validate_steps;

    #[test]
    fn test_pipeline_order_and_names_are_valid() {
        let fx = fixture([], PathBuf::from("."));
        let steps = build_pipeline(&fx.deps);
        validate_steps(&steps).unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "welcome",
                "editor",
                "toolchain",
                "sync-tool",
                "extension",
                "project",
                "plugin",
                "sync-server",
                "connect"
            ]
        );
    }

    #[tokio::test]
    async fn test_recover_maps_choices() {
        let prompt = ScriptedPrompt::new([
            Answer::Select(CHOICE_RETRY.to_string()),
            Answer::Select(CHOICE_SKIP.to_string()),
            Answer::Select(CHOICE_QUIT.to_string()),
        ]);

        let retry = recover(&prompt, Recovery::RetryOrQuit, "missing").await.unwrap();
        assert!(retry.retry);

        let skip = recover(&prompt, Recovery::RetrySkipOrQuit, "missing")
            .await
            .unwrap();
        assert!(skip.success && skip.skip);

        let quit = recover(&prompt, Recovery::RetryOrQuit, "missing").await.unwrap();
        assert!(!quit.success && !quit.retry);
        assert_eq!(quit.message.as_deref(), Some("missing"));
    }

    #[tokio::test]
    async fn test_recover_without_skip_rejects_skip_answer() {
        let prompt = ScriptedPrompt::new([Answer::Select(CHOICE_SKIP.to_string())]);
        assert!(recover(&prompt, Recovery::RetryOrQuit, "missing").await.is_err());
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("Rojo 7.4.0").as_deref(), Some("7.4.0"));
        assert_eq!(parse_version("1.90.2").as_deref(), Some("1.90.2"));
        assert_eq!(parse_version("aftman v0.3.0").as_deref(), Some("0.3.0"));
        assert_eq!(parse_version("   "), None);
    }
}
