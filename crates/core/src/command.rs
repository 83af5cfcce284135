//! One-shot command execution for step bodies
//!
//! Steps probe and install tools by running short-lived programs. They do so
//! through [`CommandRunner`] so tests can substitute canned outputs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Outcome of a short-lived command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// The program could be found and started
    pub found: bool,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Program missing from PATH (or otherwise unstartable)
    pub fn not_found() -> Self {
        Self::default()
    }

    /// Successful run with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            found: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Program ran and failed
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            found: true,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.found && self.exit_code == Some(0)
    }

    /// First non-empty line of stdout, trimmed
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.lines().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Runs a program to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`. A missing program is reported through
    /// [`CommandOutput::found`], not as an error.
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput;
}

/// Runs real processes with `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    #[instrument(level = "debug", skip(self))]
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        let result = Command::new(program)
            .args(args)
            .stdin(std::process::Stdio::null())
            .output()
            .await;

        match result {
            Ok(output) => {
                let out = CommandOutput {
                    found: true,
                    exit_code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                debug!(exit_code = ?out.exit_code, "Command finished");
                out
            }
            Err(e) => {
                debug!("Command could not be started: {}", e);
                CommandOutput::not_found()
            }
        }
    }
}

/// Answers commands from a table keyed by the full command line
#[derive(Debug, Default)]
pub struct MockCommandRunner {
    responses: Mutex<HashMap<String, Vec<CommandOutput>>>,
    calls: Mutex<Vec<String>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(program: &str, args: &[String]) -> String {
        std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Queue a response for `command_line` (program and args joined by spaces).
    /// Queued responses are consumed in order; the last one repeats.
    pub fn respond(&self, command_line: &str, output: CommandOutput) -> &Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses
                .entry(command_line.to_string())
                .or_default()
                .push(output);
        }
        self
    }

    /// Command lines run so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, command_line: &str) -> usize {
        self.calls().iter().filter(|c| *c == command_line).count()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        let key = Self::key(program, args);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }
        let Ok(mut responses) = self.responses.lock() else {
            return CommandOutput::not_found();
        };
        match responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.remove(0),
            Some(queue) => queue.first().cloned().unwrap_or_default(),
            None => CommandOutput::not_found(),
        }
    }
}
