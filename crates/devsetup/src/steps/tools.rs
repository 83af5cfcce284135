//! Command-line tool presence
//!
//! One [`ToolStep`] per required program. A tool counts as installed when
//! `<program> --version` exits successfully. When it is missing the user is
//! pointed at the installer and offered to check again; the sync tool can
//! also be installed through the toolchain manager.

use super::{parse_version, recover, Recovery, StepDeps};
use crate::ui;
use async_trait::async_trait;
use devsetup_core::command::{CommandOutput, CommandRunner};
use devsetup_core::context::{Context, ContextKey};
use devsetup_core::prompt::Prompt;
use devsetup_core::step::{CheckOutcome, Step, StepResult, Verification};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Installation through another, already installed tool
#[derive(Debug, Clone)]
pub struct AutoInstall {
    /// Context flag that must be set for the installer to be offered
    pub requires: ContextKey,
    /// Commands run in order; all must succeed
    pub commands: Vec<(String, Vec<String>)>,
    pub offer: String,
}

/// Ensures one program is on PATH
pub struct ToolStep {
    name: &'static str,
    title: &'static str,
    program: String,
    install_url: &'static str,
    installed_key: ContextKey,
    version_key: ContextKey,
    auto_install: Option<AutoInstall>,
    runner: Arc<dyn CommandRunner>,
    prompt: Arc<dyn Prompt>,
}

impl ToolStep {
    pub fn editor(deps: &StepDeps) -> Self {
        Self {
            name: "editor",
            title: "Visual Studio Code",
            program: deps.config.tools.editor.clone(),
            install_url: "https://code.visualstudio.com/download",
            installed_key: ContextKey::EditorInstalled,
            version_key: ContextKey::EditorVersion,
            auto_install: None,
            runner: deps.runner.clone(),
            prompt: deps.prompt.clone(),
        }
    }

    pub fn toolchain(deps: &StepDeps) -> Self {
        Self {
            name: "toolchain",
            title: "Aftman toolchain manager",
            program: deps.config.tools.toolchain.clone(),
            install_url: "https://github.com/LPGhatguy/aftman#installation",
            installed_key: ContextKey::ToolchainInstalled,
            version_key: ContextKey::ToolchainVersion,
            auto_install: None,
            runner: deps.runner.clone(),
            prompt: deps.prompt.clone(),
        }
    }

    pub fn sync_tool(deps: &StepDeps) -> Self {
        let toolchain = deps.config.tools.toolchain.clone();
        Self {
            name: "sync-tool",
            title: "Rojo",
            program: deps.config.tools.sync_tool.clone(),
            install_url: "https://rojo.space/docs/v7/getting-started/installation/",
            installed_key: ContextKey::SyncToolInstalled,
            version_key: ContextKey::SyncToolVersion,
            auto_install: Some(AutoInstall {
                requires: ContextKey::ToolchainInstalled,
                commands: vec![
                    (
                        toolchain.clone(),
                        vec![
                            "add".to_string(),
                            "rojo-rbx/rojo".to_string(),
                            "--global".to_string(),
                        ],
                    ),
                    (toolchain, vec!["install".to_string()]),
                ],
                offer: "Install Rojo with Aftman now?".to_string(),
            }),
            runner: deps.runner.clone(),
            prompt: deps.prompt.clone(),
        }
    }

    async fn probe(&self) -> CommandOutput {
        self.runner
            .run(&self.program, &["--version".to_string()])
            .await
    }

    fn installed(&self, output: &CommandOutput) -> StepResult {
        let mut data = Context::new().with(self.installed_key, true);
        if let Some(version) = output.first_line().and_then(parse_version) {
            data.insert(self.version_key, version);
        }
        StepResult::success_with(data)
    }

    /// Run the installer commands; true when all of them succeeded
    async fn auto_install(&self, install: &AutoInstall) -> anyhow::Result<bool> {
        for (program, args) in &install.commands {
            let output = self.runner.run(program, args).await;
            if !output.success() {
                warn!(program, ?args, exit_code = ?output.exit_code, "Installer command failed");
                ui::warn(format!("`{} {}` failed", program, args.join(" ")));
                if !output.stderr.trim().is_empty() {
                    ui::hint(output.stderr.trim());
                }
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl Step for ToolStep {
    fn name(&self) -> &str {
        self.name
    }

    fn title(&self) -> &str {
        self.title
    }

    /// Present tools are only trusted once their version has been recorded
    async fn check(&self, ctx: &Context) -> Option<CheckOutcome> {
        let found = self.probe().await.success();
        Some(CheckOutcome {
            found,
            can_skip: found && ctx.flag(self.installed_key),
        })
    }

    async fn verify(&self, _ctx: &Context) -> Option<Verification> {
        let output = self.probe().await;
        Some(if output.success() {
            Verification::ok()
        } else if output.found {
            Verification::failed(vec![format!(
                "`{} --version` exited with {:?}",
                self.program, output.exit_code
            )])
        } else {
            Verification::failed(vec![format!("`{}` is not on PATH", self.program)])
        })
    }

    #[instrument(skip_all, fields(tool = %self.program))]
    async fn run(&self, ctx: &Context) -> anyhow::Result<StepResult> {
        let output = self.probe().await;
        if output.success() {
            debug!("Tool present");
            return Ok(self.installed(&output));
        }

        if let Some(install) = &self.auto_install {
            if ctx.flag(install.requires) && self.prompt.confirm(&install.offer, true).await? {
                if self.auto_install(install).await? {
                    let output = self.probe().await;
                    if output.success() {
                        info!("Installed {}", self.program);
                        return Ok(self.installed(&output));
                    }
                    ui::warn(format!(
                        "{} was installed but `{} --version` still fails; open a new terminal so PATH is refreshed",
                        self.title, self.program
                    ));
                }
            }
        }

        ui::warn(format!("{} was not found (`{}` is not on PATH)", self.title, self.program));
        ui::hint(format!("Install it from {} and come back here.", self.install_url));
        recover(
            self.prompt.as_ref(),
            Recovery::RetryOrQuit,
            &format!("{} is required", self.title),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fixture;
    use super::*;
    use devsetup_core::attest::{CHOICE_QUIT, CHOICE_RETRY};
    use devsetup_core::prompt::Answer;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_present_tool_records_version() {
        let fx = fixture([], PathBuf::from("."));
        fx.runner.respond("code --version", CommandOutput::ok("1.90.2\nabc123\nx64\n"));
        let step = ToolStep::editor(&fx.deps);

        let result = step.run(&Context::new()).await.unwrap();
        let data = result.data.unwrap();
        assert!(data.flag(ContextKey::EditorInstalled));
        assert_eq!(data.string(ContextKey::EditorVersion), Some("1.90.2"));
    }

    #[tokio::test]
    async fn test_check_skips_only_with_recorded_install() {
        let fx = fixture([], PathBuf::from("."));
        fx.runner.respond("aftman --version", CommandOutput::ok("aftman 0.3.0"));
        let step = ToolStep::toolchain(&fx.deps);

        let fresh = step.check(&Context::new()).await.unwrap();
        assert!(fresh.found && !fresh.can_skip);

        let resumed = Context::new().with(ContextKey::ToolchainInstalled, true);
        assert!(step.check(&resumed).await.unwrap().allows_skip());
    }

    #[tokio::test]
    async fn test_missing_tool_offers_retry_and_quit() {
        let fx = fixture(
            [
                Answer::Select(CHOICE_RETRY.to_string()),
                Answer::Select(CHOICE_QUIT.to_string()),
            ],
            PathBuf::from("."),
        );
        let step = ToolStep::editor(&fx.deps);

        let first = step.run(&Context::new()).await.unwrap();
        assert!(first.retry);
        let second = step.run(&Context::new()).await.unwrap();
        assert!(!second.success && !second.retry);
        assert_eq!(second.message.as_deref(), Some("Visual Studio Code is required"));
    }

    #[tokio::test]
    async fn test_sync_tool_installs_through_toolchain() {
        let fx = fixture([Answer::Confirm(true)], PathBuf::from("."));
        fx.runner
            .respond("rojo --version", CommandOutput::not_found())
            .respond("rojo --version", CommandOutput::ok("Rojo 7.4.1"));
        fx.runner
            .respond("aftman add rojo-rbx/rojo --global", CommandOutput::ok(""))
            .respond("aftman install", CommandOutput::ok(""));
        let step = ToolStep::sync_tool(&fx.deps);

        let ctx = Context::new().with(ContextKey::ToolchainInstalled, true);
        let result = step.run(&ctx).await.unwrap();

        assert!(result.success);
        let data = result.data.unwrap();
        assert_eq!(data.string(ContextKey::SyncToolVersion), Some("7.4.1"));
        assert_eq!(
            fx.runner.calls(),
            vec![
                "rojo --version",
                "aftman add rojo-rbx/rojo --global",
                "aftman install",
                "rojo --version"
            ]
        );
    }

    #[tokio::test]
    async fn test_sync_tool_without_toolchain_does_not_offer_install() {
        let fx = fixture([Answer::Select(CHOICE_RETRY.to_string())], PathBuf::from("."));
        let step = ToolStep::sync_tool(&fx.deps);

        let result = step.run(&Context::new()).await.unwrap();
        assert!(result.retry);
        assert_eq!(fx.runner.call_count("aftman install"), 0);
        assert_eq!(fx.prompt.asked(), vec!["What would you like to do?"]);
    }

    #[tokio::test]
    async fn test_failed_installer_falls_back_to_manual() {
        let fx = fixture(
            [Answer::Confirm(true), Answer::Select(CHOICE_QUIT.to_string())],
            PathBuf::from("."),
        );
        fx.runner
            .respond("aftman add rojo-rbx/rojo --global", CommandOutput::failed(1, "network down"));
        let step = ToolStep::sync_tool(&fx.deps);

        let ctx = Context::new().with(ContextKey::ToolchainInstalled, true);
        let result = step.run(&ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(fx.runner.call_count("aftman install"), 0);
    }

    #[tokio::test]
    async fn test_verify_reports_missing_program() {
        let fx = fixture([], PathBuf::from("."));
        let step = ToolStep::editor(&fx.deps);
        let verification = step.verify(&Context::new()).await.unwrap();
        assert!(!verification.verified);
        assert_eq!(verification.issues, vec!["`code` is not on PATH"]);
    }
}
