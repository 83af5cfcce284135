//! Managed background processes
//!
//! [`ProcessSupervisor`] owns a table of long-lived child processes keyed by a
//! stable name. Each engine gets its own supervisor; nothing is global, so two
//! engines under test never see each other's processes.
//!
//! Children are started in their own process group on Unix so that stopping
//! one also stops whatever it spawned. Stopping is graceful first (SIGTERM to
//! the group), then forced after the grace period.

use crate::errors::ProcessError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

/// Default time a process gets to exit after the graceful signal
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

type OutputBuffer = Arc<Mutex<String>>;

/// Returned by [`ProcessSupervisor::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Point-in-time view of a managed process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub pid: Option<u32>,
    pub running: bool,
    pub started_at: DateTime<Utc>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Terminating signal, when the process was killed by one (Unix)
    pub signal: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
struct ExitInfo {
    code: Option<i32>,
    signal: Option<i32>,
}

impl From<ExitStatus> for ExitInfo {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;
        Self {
            code: status.code(),
            signal,
        }
    }
}

#[derive(Debug)]
struct ManagedProcess {
    child: Child,
    handle: ProcessHandle,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    exit: Option<ExitInfo>,
}

impl ManagedProcess {
    /// Reap the child if it exited; returns whether it is still running
    fn refresh(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(name = %self.handle.name, ?status, "Managed process exited");
                self.exit = Some(status.into());
                false
            }
            Err(e) => {
                warn!("Failed to poll process '{}': {}", self.handle.name, e);
                false
            }
        }
    }

    fn status(&mut self) -> ProcessStatus {
        let running = self.refresh();
        ProcessStatus {
            pid: self.handle.pid,
            running,
            started_at: self.handle.started_at,
            stdout: read_buffer(&self.stdout),
            stderr: read_buffer(&self.stderr),
            exit_code: self.exit.and_then(|e| e.code),
            signal: self.exit.and_then(|e| e.signal),
        }
    }
}

fn read_buffer(buffer: &OutputBuffer) -> String {
    buffer.lock().map(|b| b.clone()).unwrap_or_default()
}

fn spawn_reader<R>(stream: Option<R>, buffer: OutputBuffer)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(stream) = stream else {
        return;
    };
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Ok(mut buf) = buffer.lock() {
                buf.push_str(&line);
                buf.push('\n');
            }
        }
    });
}

/// Start/stop/poll long-lived child processes by name
#[derive(Debug)]
pub struct ProcessSupervisor {
    processes: Mutex<HashMap<String, ManagedProcess>>,
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_STOP_GRACE)
    }

    /// Supervisor with a custom graceful-stop window
    pub fn with_grace(grace: Duration) -> Self {
        Self {
            processes: Mutex::new(HashMap::new()),
            grace,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<String, ManagedProcess>> {
        match self.processes.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start `command` with `args` under `name`.
    ///
    /// A previous process with the same name that already exited is replaced;
    /// one that is still running is an error.
    #[instrument(skip(self, args), fields(args = ?args))]
    pub fn start(
        &self,
        command: &str,
        args: &[String],
        name: &str,
    ) -> Result<ProcessHandle, ProcessError> {
        if command.trim().is_empty() {
            return Err(ProcessError::InvalidCommand {
                message: format!("empty command for process '{}'", name),
            });
        }

        let mut table = self.table();
        if let Some(existing) = table.get_mut(name) {
            if existing.refresh() {
                return Err(ProcessError::AlreadyRunning {
                    name: name.to_string(),
                });
            }
        }

        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
            command: command.to_string(),
            source,
        })?;

        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();
        spawn_reader(child.stdout.take(), Arc::clone(&stdout));
        spawn_reader(child.stderr.take(), Arc::clone(&stderr));

        let handle = ProcessHandle {
            name: name.to_string(),
            pid: child.id(),
            started_at: Utc::now(),
        };
        info!(pid = ?handle.pid, "Started managed process '{}'", name);

        table.insert(
            name.to_string(),
            ManagedProcess {
                child,
                handle: handle.clone(),
                stdout,
                stderr,
                exit: None,
            },
        );
        Ok(handle)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.table()
            .get_mut(name)
            .map(ManagedProcess::refresh)
            .unwrap_or(false)
    }

    pub fn status(&self, name: &str) -> Option<ProcessStatus> {
        self.table().get_mut(name).map(ManagedProcess::status)
    }

    /// Names of every tracked process, running or not
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop and forget the process. Returns `false` if no process had that name.
    #[instrument(skip(self))]
    pub async fn stop(&self, name: &str) -> bool {
        let Some(mut process) = self.table().remove(name) else {
            debug!("No managed process named '{}'", name);
            return false;
        };

        if !process.refresh() {
            debug!("Process '{}' had already exited", name);
            return true;
        }

        let graceful = match process.handle.pid {
            Some(pid) => signal_group(pid, StopSignal::Terminate),
            None => false,
        };

        if graceful {
            match tokio::time::timeout(self.grace, process.child.wait()).await {
                Ok(Ok(status)) => {
                    info!(?status, "Process '{}' stopped", name);
                    return true;
                }
                Ok(Err(e)) => warn!("Failed waiting for process '{}': {}", name, e),
                Err(_) => warn!(
                    "Process '{}' did not exit within {:?}; killing it",
                    name, self.grace
                ),
            }
        }

        if let Some(pid) = process.handle.pid {
            signal_group(pid, StopSignal::Kill);
        }
        if let Err(e) = process.child.kill().await {
            warn!("Failed to kill process '{}': {}", name, e);
        }
        true
    }

    /// Stop every tracked process; returns how many were stopped
    pub async fn stop_all(&self) -> usize {
        let mut stopped = 0;
        for name in self.names() {
            if self.stop(&name).await {
                stopped += 1;
            }
        }
        stopped
    }
}

#[derive(Debug, Clone, Copy)]
enum StopSignal {
    Terminate,
    Kill,
}

/// Signal the whole process group led by `pid`
#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_group(pid: u32, signal: StopSignal) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    let signal = match signal {
        StopSignal::Terminate => libc::SIGTERM,
        StopSignal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
    // addresses the process group created by `process_group(0)`.
    unsafe { libc::kill(-pid, signal) == 0 }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: StopSignal) -> bool {
    false
}
