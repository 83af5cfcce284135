//! Live sync server
//!
//! [`SyncServer`] owns the configuration for `rojo serve` and hands out a
//! [`ServerLauncher`] for the current project. The process is supervised
//! under [`SYNC_SERVER_NAME`], so the engine's interrupt handling and the
//! step's cleanup both reach it.

use super::{recover, Recovery, StepDeps};
use crate::ui;
use crate::ui::spinner::PlainSpinner;
use async_trait::async_trait;
use devsetup_core::config::SyncServerConfig;
use devsetup_core::context::{Context, ContextKey};
use devsetup_core::network::NetworkProber;
use devsetup_core::process::ProcessSupervisor;
use devsetup_core::prompt::Prompt;
use devsetup_core::server::{ServerLauncher, ServerSpec, PORT_PLACEHOLDER};
use devsetup_core::step::{Step, StepResult, Verification};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};

/// Supervisor name of the sync server process
pub const SYNC_SERVER_NAME: &str = "sync-server";

/// Launch settings and handles for the sync server
pub struct SyncServer {
    config: SyncServerConfig,
    supervisor: Arc<ProcessSupervisor>,
    prober: Arc<dyn NetworkProber>,
}

impl SyncServer {
    pub fn new(
        config: SyncServerConfig,
        supervisor: Arc<ProcessSupervisor>,
        prober: Arc<dyn NetworkProber>,
    ) -> Self {
        Self {
            config,
            supervisor,
            prober,
        }
    }

    /// Launcher serving `project`: the configured command followed by
    /// `<project> --port <port>`
    pub fn launcher(&self, project: &Path) -> anyhow::Result<ServerLauncher> {
        let (program, mut args) = self.config.command_parts()?;
        args.push(project.display().to_string());
        args.push("--port".to_string());
        args.push(PORT_PLACEHOLDER.to_string());

        let spec = ServerSpec {
            name: SYNC_SERVER_NAME.to_string(),
            program,
            args,
            host: self.config.host.clone(),
            preferred_port: self.config.preferred_port,
            fallback_ports: self.config.fallback_ports.clone(),
            poll_interval: self.config.poll_interval(),
            startup_timeout: self.config.startup_timeout(),
        };
        Ok(ServerLauncher::new(
            spec,
            self.supervisor.clone(),
            self.prober.clone(),
        ))
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running(SYNC_SERVER_NAME)
    }

    /// Whether the server on `port` is healthy. A server this process did not
    /// start (an earlier session) can only be judged by its port.
    pub async fn health(&self, project: &Path, port: u16) -> anyhow::Result<Verification> {
        if self.is_running() {
            return Ok(self.launcher(project)?.health(port).await);
        }
        Ok(if self.prober.is_port_open(port, &self.config.host).await {
            Verification::ok()
        } else {
            Verification::failed(vec![format!("nothing is listening on port {}", port)])
        })
    }

    pub async fn stop(&self) -> bool {
        self.supervisor.stop(SYNC_SERVER_NAME).await
    }
}

/// Launch the sync server for `project` and report its state as step data
pub(crate) async fn start_server(
    server: &SyncServer,
    prompt: &dyn Prompt,
    project: &Path,
) -> anyhow::Result<StepResult> {
    let launcher = server.launcher(project)?;
    let spinner = PlainSpinner::start("Starting the sync server…");
    match launcher.launch().await {
        Ok(ready) => {
            spinner.finish_with_message(&format!("Sync server listening on port {}", ready.port));
            if !ready.reachable {
                ui::warn("The server accepts connections but did not answer HTTP yet");
            }
            Ok(StepResult::success_with(
                Context::new()
                    .with(ContextKey::ServerPort, ready.port)
                    .with(ContextKey::ServerRunning, true)
                    .with(ContextKey::ServerReachable, ready.reachable),
            ))
        }
        Err(err) => {
            spinner.fail_with_message("The sync server did not start");
            ui::warn(err.to_string());
            if !err.is_retryable() {
                return Ok(StepResult::fatal(err.to_string()));
            }
            recover(prompt, Recovery::RetryOrQuit, "sync server did not start").await
        }
    }
}

/// Starts `rojo serve` for the project and keeps it for the session
pub struct SyncServerStep {
    server: Arc<SyncServer>,
    prompt: Arc<dyn Prompt>,
}

impl SyncServerStep {
    pub fn new(deps: &StepDeps) -> Self {
        Self {
            server: deps.server.clone(),
            prompt: deps.prompt.clone(),
        }
    }
}

#[async_trait]
impl Step for SyncServerStep {
    fn name(&self) -> &str {
        SYNC_SERVER_NAME
    }

    fn title(&self) -> &str {
        "Sync server"
    }

    fn owns_resources(&self) -> bool {
        true
    }

    async fn verify(&self, ctx: &Context) -> Option<Verification> {
        let project = ctx.string(ContextKey::ProjectPath)?;
        let port = ctx.port(ContextKey::ServerPort)?;
        Some(
            self.server
                .health(Path::new(project), port)
                .await
                .unwrap_or_else(|e| Verification::failed(vec![e.to_string()])),
        )
    }

    #[instrument(skip_all)]
    async fn run(&self, ctx: &Context) -> anyhow::Result<StepResult> {
        let Some(project) = ctx.string(ContextKey::ProjectPath) else {
            return Ok(StepResult::fatal(
                "no project recorded; run devsetup --reset to start over",
            ));
        };
        if self.server.is_running() {
            info!("Restarting sync server");
            self.server.stop().await;
        }
        start_server(&self.server, self.prompt.as_ref(), Path::new(project)).await
    }

    async fn cleanup(&self, _ctx: &Context) -> anyhow::Result<()> {
        self.server.stop().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{fixture, OpenProber};
    use super::*;
    use devsetup_core::attest::CHOICE_QUIT;
    use devsetup_core::prompt::Answer;
    use std::path::PathBuf;
    use std::time::Duration;

    fn server_with_command(command: &str) -> Arc<SyncServer> {
        let config = SyncServerConfig {
            command: command.to_string(),
            poll_interval_ms: 20,
            startup_timeout_secs: 2,
            ..SyncServerConfig::default()
        };
        Arc::new(SyncServer::new(
            config,
            Arc::new(ProcessSupervisor::with_grace(Duration::from_millis(200))),
            Arc::new(OpenProber),
        ))
    }

    #[test]
    fn test_launcher_appends_project_and_port() {
        let server = server_with_command("rojo serve");
        let launcher = server.launcher(Path::new("/work/obby")).unwrap();
        assert_eq!(launcher.spec().program, "rojo");
        assert_eq!(
            launcher.spec().args_for(34873),
            vec!["serve", "/work/obby", "--port", "34873"]
        );
        assert_eq!(launcher.spec().name, SYNC_SERVER_NAME);
    }

    #[tokio::test]
    async fn test_missing_project_is_fatal() {
        let fx = fixture([], PathBuf::from("."));
        let step = SyncServerStep::new(&fx.deps);
        let result = step.run(&Context::new()).await.unwrap();
        assert!(!result.success && !result.retry);
    }

    #[tokio::test]
    async fn test_spawn_failure_offers_recovery() {
        let mut fx = fixture([Answer::Select(CHOICE_QUIT.to_string())], PathBuf::from("."));
        fx.deps.server = server_with_command("devsetup-no-such-program-xyz serve");
        let step = SyncServerStep::new(&fx.deps);

        let ctx = Context::new().with(ContextKey::ProjectPath, "/work/obby");
        let result = step.run(&ctx).await.unwrap();
        assert!(!result.success);
        assert_eq!(fx.prompt.asked(), vec!["What would you like to do?"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_records_port_and_cleanup_stops() {
        let mut fx = fixture([], PathBuf::from("."));
        fx.deps.server = server_with_command("sh -c 'sleep 30' sync");
        let step = SyncServerStep::new(&fx.deps);

        let ctx = Context::new().with(ContextKey::ProjectPath, "/work/obby");
        let result = step.run(&ctx).await.unwrap();
        let data = result.data.unwrap();
        assert_eq!(data.port(ContextKey::ServerPort), Some(34872));
        assert!(data.flag(ContextKey::ServerRunning));
        assert!(data.flag(ContextKey::ServerReachable));
        assert!(fx.deps.server.is_running());

        let mut after = ctx.clone();
        after.merge(data);
        assert!(step.verify(&after).await.unwrap().verified);

        step.cleanup(&after).await.unwrap();
        assert!(!fx.deps.server.is_running());
    }

    #[tokio::test]
    async fn test_verify_needs_a_recorded_port() {
        let fx = fixture([], PathBuf::from("."));
        let step = SyncServerStep::new(&fx.deps);
        assert!(step.verify(&Context::new()).await.is_none());
    }

    #[tokio::test]
    async fn test_verify_unsupervised_server_by_port() {
        let fx = fixture([], PathBuf::from("."));
        let step = SyncServerStep::new(&fx.deps);
        let ctx = Context::new()
            .with(ContextKey::ProjectPath, "/work/obby")
            .with(ContextKey::ServerPort, 34872);
        // The fixture prober reports every port open
        assert!(step.verify(&ctx).await.unwrap().verified);
    }
}
