//! Background server launch and readiness
//!
//! [`ServerLauncher`] picks a free port, starts the server under a stable
//! name, waits for it to accept connections, then probes it once over HTTP.
//! Every failure is a [`LaunchError`] the calling step can turn into a retry.

use crate::errors::ProcessError;
use crate::network::{find_free_port, NetworkProber};
use crate::process::ProcessSupervisor;
use crate::step::Verification;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Placeholder replaced by the chosen port in [`ServerSpec::args`]
pub const PORT_PLACEHOLDER: &str = "{port}";

const OUTPUT_SETTLE: Duration = Duration::from_millis(100);

/// Why a launch did not produce a ready server
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("No free port among {tried:?}")]
    NoFreePort { tried: Vec<u16> },

    #[error(transparent)]
    Spawn(#[from] ProcessError),

    #[error("Server did not open port {port} within {timeout:?}")]
    Timeout { port: u16, timeout: Duration },

    #[error("Server exited before it was ready (exit code {exit_code:?}): {stderr}")]
    ExitedEarly {
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl LaunchError {
    /// Whether the user can fix the environment and try again.
    /// Every launch failure is; an empty command line is not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LaunchError::Spawn(ProcessError::InvalidCommand { .. })
        )
    }
}

/// What to launch and how to wait for it
#[derive(Debug, Clone)]
pub struct ServerSpec {
    /// Supervisor name for the process
    pub name: String,
    pub program: String,
    /// Arguments; [`PORT_PLACEHOLDER`] is replaced with the chosen port
    pub args: Vec<String>,
    pub host: String,
    pub preferred_port: u16,
    pub fallback_ports: Vec<u16>,
    pub poll_interval: Duration,
    pub startup_timeout: Duration,
}

impl ServerSpec {
    /// Arguments with the port substituted
    pub fn args_for(&self, port: u16) -> Vec<String> {
        let port = port.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(PORT_PLACEHOLDER, &port))
            .collect()
    }

    pub fn url_for(&self, port: u16) -> String {
        format!("http://{}:{}/", self.host, port)
    }

    fn candidate_ports(&self) -> Vec<u16> {
        std::iter::once(self.preferred_port)
            .chain(self.fallback_ports.iter().copied())
            .collect()
    }
}

/// A server that accepts connections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReady {
    pub port: u16,
    pub pid: Option<u32>,
    /// Result of the single HTTP probe; `false` is only a warning
    pub reachable: bool,
}

/// Launches one named background server
pub struct ServerLauncher {
    spec: ServerSpec,
    supervisor: Arc<ProcessSupervisor>,
    prober: Arc<dyn NetworkProber>,
}

impl ServerLauncher {
    pub fn new(
        spec: ServerSpec,
        supervisor: Arc<ProcessSupervisor>,
        prober: Arc<dyn NetworkProber>,
    ) -> Self {
        Self {
            spec,
            supervisor,
            prober,
        }
    }

    pub fn spec(&self) -> &ServerSpec {
        &self.spec
    }

    pub fn is_running(&self) -> bool {
        self.supervisor.is_running(&self.spec.name)
    }

    /// Start the server and wait until it is ready
    #[instrument(skip(self), fields(name = %self.spec.name))]
    pub async fn launch(&self) -> Result<ServerReady, LaunchError> {
        let port = find_free_port(
            self.prober.as_ref(),
            self.spec.preferred_port,
            &self.spec.fallback_ports,
        )
        .await
        .ok_or_else(|| LaunchError::NoFreePort {
            tried: self.spec.candidate_ports(),
        })?;
        if port != self.spec.preferred_port {
            info!(
                "Port {} is busy, using {} instead",
                self.spec.preferred_port, port
            );
        }

        let handle =
            self.supervisor
                .start(&self.spec.program, &self.spec.args_for(port), &self.spec.name)?;

        self.wait_until_ready(port).await?;

        let reachable = self.prober.is_http_reachable(&self.spec.url_for(port)).await;
        if !reachable {
            warn!(
                "Server on port {} accepts connections but did not answer HTTP; continuing",
                port
            );
        }

        info!(port, pid = ?handle.pid, reachable, "Server ready");
        Ok(ServerReady {
            port,
            pid: handle.pid,
            reachable,
        })
    }

    async fn wait_until_ready(&self, port: u16) -> Result<(), LaunchError> {
        let deadline = tokio::time::Instant::now() + self.spec.startup_timeout;
        loop {
            if let Some(status) = self.supervisor.status(&self.spec.name) {
                if !status.running {
                    // Output readers can trail the exit slightly
                    tokio::time::sleep(OUTPUT_SETTLE).await;
                    let stderr = self
                        .supervisor
                        .status(&self.spec.name)
                        .map(|s| s.stderr)
                        .unwrap_or(status.stderr);
                    self.supervisor.stop(&self.spec.name).await;
                    return Err(LaunchError::ExitedEarly {
                        exit_code: status.exit_code,
                        stderr: stderr.trim().to_string(),
                    });
                }
            }

            if self.prober.is_port_open(port, &self.spec.host).await {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                debug!("Startup timeout reached; stopping server");
                self.supervisor.stop(&self.spec.name).await;
                return Err(LaunchError::Timeout {
                    port,
                    timeout: self.spec.startup_timeout,
                });
            }
            tokio::time::sleep(self.spec.poll_interval).await;
        }
    }

    /// Process running and port open
    pub async fn health(&self, port: u16) -> Verification {
        let mut issues = Vec::new();
        if !self.is_running() {
            issues.push(format!("{} is not running", self.spec.name));
        }
        if !self.prober.is_port_open(port, &self.spec.host).await {
            issues.push(format!("nothing is listening on port {}", port));
        }
        Verification::from_issues(issues)
    }

    /// Stop the server (graceful, then forced)
    pub async fn stop(&self) -> bool {
        self.supervisor.stop(&self.spec.name).await
    }
}
