use super::server::start_server;
use super::{StepDeps, SyncServer};
use crate::ui;
use async_trait::async_trait;
use console::style;
use devsetup_core::attest::await_attestation;
use devsetup_core::context::{Context, ContextKey};
use devsetup_core::prompt::Prompt;
use devsetup_core::step::{Step, StepKind, StepResult};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const QUESTION: &str = "In Studio, click Connect in the Rojo plugin. Is it connected?";

/// The user confirms Studio is talking to the sync server
pub struct ConnectStep {
    server: Arc<SyncServer>,
    prompt: Arc<dyn Prompt>,
}

impl ConnectStep {
    pub fn new(deps: &StepDeps) -> Self {
        Self {
            server: deps.server.clone(),
            prompt: deps.prompt.clone(),
        }
    }
}

#[async_trait]
impl Step for ConnectStep {
    fn name(&self) -> &str {
        "connect"
    }

    fn title(&self) -> &str {
        "Connect Studio"
    }

    fn kind(&self) -> StepKind {
        StepKind::Attestation
    }

    async fn run(&self, ctx: &Context) -> anyhow::Result<StepResult> {
        // After a resume the server from the earlier session is gone
        let mut data = Context::new();
        if !self.server.is_running() {
            let Some(project) = ctx.string(ContextKey::ProjectPath) else {
                return Ok(StepResult::fatal(
                    "no project recorded; run devsetup --reset to start over",
                ));
            };
            info!("Sync server not running; starting it before connecting");
            let started = start_server(&self.server, self.prompt.as_ref(), Path::new(project)).await?;
            if !started.success || started.retry {
                return Ok(started);
            }
            if let Some(server_data) = started.data {
                data.merge(server_data);
            }
        }

        let port = data
            .port(ContextKey::ServerPort)
            .or_else(|| ctx.port(ContextKey::ServerPort));
        if let Some(port) = port {
            ui::say(format!(
                "The sync server is running on port {}.",
                style(port).cyan().bold()
            ));
        }
        ui::hint("Open a place in Roblox Studio, open the Plugins tab and click Rojo > Connect.");

        let result = await_attestation(self.prompt.as_ref(), QUESTION).await?;
        if result.success && !result.skip {
            data.insert(ContextKey::StudioConnected, true);
        }
        if result.success && !data.is_empty() {
            return Ok(result.with_data(data));
        }
        Ok(result)
    }

    async fn cleanup(&self, _ctx: &Context) -> anyhow::Result<()> {
        self.server.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::fixture;
    use super::*;
    use devsetup_core::attest::{CHOICE_RETRY, CHOICE_SKIP};
    use devsetup_core::prompt::Answer;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_project_is_fatal_when_server_is_down() {
        let fx = fixture([], PathBuf::from("."));
        let step = ConnectStep::new(&fx.deps);
        let result = step.run(&Context::new()).await.unwrap();
        assert!(!result.success && !result.retry);
        assert!(fx.prompt.asked().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restarts_server_and_records_connection() {
        use devsetup_core::config::SyncServerConfig;
        use devsetup_core::process::ProcessSupervisor;
        use std::time::Duration;

        let mut fx = fixture([Answer::Confirm(true)], PathBuf::from("."));
        let config = SyncServerConfig {
            command: "sh -c 'sleep 30' sync".to_string(),
            poll_interval_ms: 20,
            ..SyncServerConfig::default()
        };
        fx.deps.server = Arc::new(SyncServer::new(
            config,
            Arc::new(ProcessSupervisor::with_grace(Duration::from_millis(200))),
            Arc::new(super::super::test_support::OpenProber),
        ));
        let step = ConnectStep::new(&fx.deps);

        let ctx = Context::new().with(ContextKey::ProjectPath, "/work/obby");
        let result = step.run(&ctx).await.unwrap();
        let data = result.data.clone().unwrap();
        assert!(result.success);
        assert!(data.flag(ContextKey::StudioConnected));
        assert!(data.flag(ContextKey::ServerRunning));
        assert_eq!(fx.prompt.asked(), vec![QUESTION]);

        step.cleanup(&ctx).await.unwrap();
        assert!(!fx.deps.server.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_skipped_connection_keeps_server_data_only() {
        use devsetup_core::config::SyncServerConfig;
        use devsetup_core::process::ProcessSupervisor;
        use std::time::Duration;

        let mut fx = fixture(
            [Answer::Confirm(false), Answer::Select(CHOICE_SKIP.to_string())],
            PathBuf::from("."),
        );
        let config = SyncServerConfig {
            command: "sh -c 'sleep 30' sync".to_string(),
            poll_interval_ms: 20,
            ..SyncServerConfig::default()
        };
        fx.deps.server = Arc::new(SyncServer::new(
            config,
            Arc::new(ProcessSupervisor::with_grace(Duration::from_millis(200))),
            Arc::new(super::super::test_support::OpenProber),
        ));
        let step = ConnectStep::new(&fx.deps);
        assert_eq!(step.kind(), StepKind::Attestation);

        let ctx = Context::new().with(ContextKey::ProjectPath, "/work/obby");
        let result = step.run(&ctx).await.unwrap();
        assert!(result.success && result.skip);
        let data = result.data.unwrap();
        assert!(!data.flag(ContextKey::StudioConnected));
        assert_eq!(data.port(ContextKey::ServerPort), Some(34872));

        step.cleanup(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_declined_attestation_can_retry() {
        let fx = fixture(
            [Answer::Confirm(false), Answer::Select(CHOICE_RETRY.to_string())],
            PathBuf::from("."),
        );
        let result = await_attestation(fx.deps.prompt.as_ref(), QUESTION).await.unwrap();
        assert!(result.retry);
    }
}
