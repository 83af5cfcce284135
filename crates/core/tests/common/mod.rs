//! Shared test helpers for core integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use devsetup_core::context::Context;
use devsetup_core::engine::SetupEngine;
use devsetup_core::errors::PromptError;
use devsetup_core::network::NetworkProber;
use devsetup_core::persistence::ProgressStore;
use devsetup_core::process::ProcessSupervisor;
use devsetup_core::prompt::{Answer, ScriptedPrompt};
use devsetup_core::step::{CheckOutcome, Step, StepResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// What a scripted `run` call does
#[derive(Debug, Clone)]
pub enum Run {
    Return(StepResult),
    Crash(String),
    /// Fails the way a terminal prompt does when the user presses Ctrl+C
    PromptInterrupted,
    /// Never returns (until the engine is interrupted)
    Hang,
}

/// Call counters shared between a test and the step it handed to the engine
#[derive(Debug, Default, Clone)]
pub struct Calls {
    pub check: Arc<AtomicUsize>,
    pub run: Arc<AtomicUsize>,
    pub cleanup: Arc<AtomicUsize>,
    /// Context seen by each `run` call
    pub seen: Arc<Mutex<Vec<Context>>>,
}

impl Calls {
    pub fn checks(&self) -> usize {
        self.check.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.run.load(Ordering::SeqCst)
    }

    pub fn cleanups(&self) -> usize {
        self.cleanup.load(Ordering::SeqCst)
    }

    pub fn last_seen(&self) -> Option<Context> {
        self.seen.lock().unwrap().last().cloned()
    }
}

/// A step that replays scripted `run` outcomes; the last one repeats
pub struct ScriptedStep {
    name: String,
    check: Option<CheckOutcome>,
    runs: Mutex<VecDeque<Run>>,
    owns_resources: bool,
    fail_cleanup: bool,
    calls: Calls,
}

impl ScriptedStep {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            check: None,
            runs: Mutex::new(VecDeque::from([Run::Return(StepResult::success())])),
            owns_resources: false,
            fail_cleanup: false,
            calls: Calls::default(),
        }
    }

    pub fn check(mut self, outcome: CheckOutcome) -> Self {
        self.check = Some(outcome);
        self
    }

    pub fn runs(self, runs: impl IntoIterator<Item = Run>) -> Self {
        *self.runs.lock().unwrap() = runs.into_iter().collect();
        self
    }

    pub fn returns(self, result: StepResult) -> Self {
        self.runs([Run::Return(result)])
    }

    pub fn owning_resources(mut self) -> Self {
        self.owns_resources = true;
        self
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    pub fn calls(&self) -> Calls {
        self.calls.clone()
    }

    pub fn boxed(self) -> (Box<dyn Step>, Calls) {
        let calls = self.calls();
        (Box::new(self), calls)
    }
}

#[async_trait]
impl Step for ScriptedStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn owns_resources(&self) -> bool {
        self.owns_resources
    }

    async fn check(&self, _ctx: &Context) -> Option<CheckOutcome> {
        self.calls.check.fetch_add(1, Ordering::SeqCst);
        self.check
    }

    async fn run(&self, ctx: &Context) -> anyhow::Result<StepResult> {
        self.calls.run.fetch_add(1, Ordering::SeqCst);
        self.calls.seen.lock().unwrap().push(ctx.clone());
        let next = {
            let mut runs = self.runs.lock().unwrap();
            if runs.len() > 1 {
                runs.pop_front()
            } else {
                runs.front().cloned()
            }
        };
        match next.unwrap_or(Run::Return(StepResult::success())) {
            Run::Return(result) => Ok(result),
            Run::Crash(message) => Err(anyhow::anyhow!(message)),
            Run::PromptInterrupted => Err(PromptError::Interrupted.into()),
            Run::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(StepResult::success())
            }
        }
    }

    async fn cleanup(&self, _ctx: &Context) -> anyhow::Result<()> {
        self.calls.cleanup.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            anyhow::bail!("cleanup exploded");
        }
        Ok(())
    }
}

pub fn store_in(dir: &TempDir) -> ProgressStore {
    ProgressStore::new(dir.path().join(".devsetup-progress.json"))
}

pub fn engine_with(
    store: ProgressStore,
    steps: Vec<Box<dyn Step>>,
    answers: Vec<Answer>,
) -> SetupEngine {
    SetupEngine::new(
        steps,
        store,
        Arc::new(ScriptedPrompt::new(answers)),
        Arc::new(ProcessSupervisor::with_grace(Duration::from_millis(500))),
    )
    .unwrap()
}

/// Prober with scripted answers that records every port it was asked about
#[derive(Debug, Default)]
pub struct MockProber {
    pub available: Vec<u16>,
    /// `is_port_open` answers true from this call number on (1-based)
    pub open_after: Option<usize>,
    pub http_reachable: bool,
    pub availability_probes: Mutex<Vec<u16>>,
    pub open_probes: AtomicUsize,
}

impl MockProber {
    pub fn probed(&self) -> Vec<u16> {
        self.availability_probes.lock().unwrap().clone()
    }
}

#[async_trait]
impl NetworkProber for MockProber {
    async fn is_port_open(&self, _port: u16, _host: &str) -> bool {
        let call = self.open_probes.fetch_add(1, Ordering::SeqCst) + 1;
        self.open_after.is_some_and(|after| call >= after)
    }

    async fn is_port_available(&self, port: u16) -> bool {
        self.availability_probes.lock().unwrap().push(port);
        self.available.contains(&port)
    }

    async fn is_http_reachable(&self, _url: &str) -> bool {
        self.http_reachable
    }
}
