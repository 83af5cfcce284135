//! Step orchestration engine
//!
//! [`SetupEngine`] drives an ordered list of [`Step`]s against one shared
//! [`Context`], strictly one step at a time:
//!
//! 1. Unless a reset is requested, a saved [`ProgressRecord`] is offered for
//!    resume. Accepting restores position, completed names and context
//!    verbatim; declining (or having nothing to resume) clears any stale
//!    record.
//! 2. For each remaining step a presence check may skip `run`. Otherwise the
//!    result of `run` decides: retry repeats the step without advancing or
//!    persisting, failure aborts the pipeline with the record left on disk,
//!    success merges the returned data, persists, and advances.
//! 3. A completed pipeline removes the record.
//!
//! [`SetupEngine::run_until`] races the loop against a shutdown future. On
//! interruption the active step and every resource-owning step are cleaned
//! up and all supervised processes stopped; no extra record is written, so
//! the next run resumes after the last completed step.

use crate::context::Context;
use crate::errors::{PromptError, Result, SetupError};
use crate::persistence::{ProgressRecord, ProgressStore, RECORD_VERSION};
use crate::process::ProcessSupervisor;
use crate::progress::{ProgressEmitter, ProgressEvent};
use crate::prompt::Prompt;
use crate::step::{validate_steps, Disposition, Step, StepKind, Verification};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// How a step ended in this run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// `run` was called and succeeded
    Executed,
    /// The presence check allowed skipping, or `run` reported nothing to do
    Skipped,
    /// `run` reported a fatal failure or returned an error
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Executed => "executed",
            StepStatus::Skipped => "skipped",
            StepStatus::Failed => "failed",
        }
    }
}

/// Outcome of one step in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    /// Number of times the step was checked/run, retries included
    pub attempts: u32,
    /// Skip or failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub duration_ms: u64,
}

/// Summary of a pipeline run
///
/// Only steps processed in this invocation are listed; steps restored from a
/// resumed record are not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub steps: Vec<StepReport>,
    /// A saved record was accepted
    pub resumed: bool,
    /// Position the run resumed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<usize>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, report: StepReport) {
        self.steps.push(report);
    }

    pub fn report(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|r| r.name == name)
    }

    fn with_status(&self, status: StepStatus) -> Vec<&StepReport> {
        self.steps.iter().filter(|r| r.status == status).collect()
    }

    pub fn executed_steps(&self) -> Vec<&StepReport> {
        self.with_status(StepStatus::Executed)
    }

    pub fn skipped_steps(&self) -> Vec<&StepReport> {
        self.with_status(StepStatus::Skipped)
    }

    pub fn failed_steps(&self) -> Vec<&StepReport> {
        self.with_status(StepStatus::Failed)
    }

    /// No step failed
    pub fn all_complete(&self) -> bool {
        self.steps.iter().all(|r| r.status != StepStatus::Failed)
    }
}

/// Result of [`SetupEngine::verify_all`] for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepVerification {
    pub name: String,
    pub title: String,
    pub kind: StepKind,
    /// `None` when the step cannot verify itself
    pub verification: Option<Verification>,
}

/// Sequential, resumable step pipeline
pub struct SetupEngine {
    steps: Vec<Box<dyn Step>>,
    store: ProgressStore,
    prompt: Arc<dyn Prompt>,
    supervisor: Arc<ProcessSupervisor>,
    emitter: Option<Box<dyn ProgressEmitter>>,
    current_index: usize,
    completed: Vec<String>,
    context: Context,
    /// Step currently inside `check` or `run`
    active: Option<usize>,
    summary: RunSummary,
}

impl std::fmt::Debug for SetupEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupEngine")
            .field("steps", &self.step_names())
            .field("store", &self.store)
            .field("current_index", &self.current_index)
            .field("completed", &self.completed)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl SetupEngine {
    /// Build an engine; the step list must be non-empty with unique names
    pub fn new(
        steps: Vec<Box<dyn Step>>,
        store: ProgressStore,
        prompt: Arc<dyn Prompt>,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Result<Self> {
        validate_steps(&steps)?;
        Ok(Self {
            steps,
            store,
            prompt,
            supervisor,
            emitter: None,
            current_index: 0,
            completed: Vec::new(),
            context: Context::new(),
            active: None,
            summary: RunSummary::new(),
        })
    }

    /// Send progress events to `emitter`
    pub fn with_emitter(mut self, emitter: Box<dyn ProgressEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn completed_states(&self) -> &[String] {
        &self.completed
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Summary of the latest (possibly failed) run
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Current position as a persistable record
    pub fn snapshot(&self) -> ProgressRecord {
        ProgressRecord::new(self.current_index, self.completed.clone(), self.context.clone())
    }

    /// Adopt a record's position, completed names and context verbatim.
    ///
    /// Records written by a different step list are not migrated; unknown
    /// names are only reported.
    pub fn restore(&mut self, record: ProgressRecord) {
        if record.version != RECORD_VERSION {
            warn!(
                "Progress record version {} differs from {}; restoring as-is",
                record.version, RECORD_VERSION
            );
        }
        let unknown: Vec<&str> = record
            .completed_states
            .iter()
            .map(String::as_str)
            .filter(|name| !self.steps.iter().any(|s| s.name() == *name))
            .collect();
        if !unknown.is_empty() {
            warn!(
                "Progress record mentions steps that no longer exist: {}",
                unknown.join(", ")
            );
        }
        if record.current_state_index > self.steps.len() {
            warn!(
                "Progress record position {} is past the last step ({})",
                record.current_state_index,
                self.steps.len()
            );
        }

        self.current_index = record.current_state_index;
        self.completed = record.completed_states;
        self.context = record.context;
    }

    fn reset_state(&mut self) {
        self.current_index = 0;
        self.completed.clear();
        self.context = Context::new();
    }

    fn emit(&mut self, event: ProgressEvent) {
        if let Some(emitter) = self.emitter.as_mut() {
            if let Err(e) = emitter.emit(&event) {
                warn!("Failed to emit progress event: {}", e);
            }
        }
    }

    /// Run the whole pipeline
    pub async fn run(&mut self, reset: bool) -> Result<RunSummary> {
        self.run_until(reset, std::future::pending::<()>()).await
    }

    /// Run the pipeline until it finishes or `shutdown` resolves
    #[instrument(skip_all, fields(reset))]
    pub async fn run_until<F>(&mut self, reset: bool, shutdown: F) -> Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        self.summary = RunSummary::new();
        self.active = None;

        let outcome = tokio::select! {
            result = self.drive(reset) => Some(result),
            _ = shutdown => None,
        };

        match outcome {
            Some(Ok(())) => Ok(self.summary.clone()),
            Some(Err(e)) => Err(e),
            None => {
                self.interrupt().await;
                Err(SetupError::Interrupted)
            }
        }
    }

    async fn decide_resume(&mut self, reset: bool) -> Result<()> {
        if reset {
            debug!("Reset requested; ignoring any saved progress");
            self.discard_record();
            self.reset_state();
            return Ok(());
        }

        let Some(record) = self.store.load() else {
            // Clears corrupted leftovers too
            self.discard_record();
            self.reset_state();
            return Ok(());
        };

        let question = format!(
            "Found saved progress ({} of {} steps done). Resume where you left off?",
            record.completed_states.len(),
            self.steps.len()
        );
        let resume = match self.prompt.confirm(&question, true).await {
            Ok(answer) => answer,
            Err(PromptError::Interrupted) => {
                self.interrupt().await;
                return Err(SetupError::Interrupted);
            }
            Err(e) => {
                warn!("Resume prompt failed ({}); starting fresh", e);
                false
            }
        };

        if resume {
            let index = record.current_state_index;
            let completed = record.completed_states.clone();
            self.restore(record);
            self.summary.resumed = true;
            self.summary.resumed_from = Some(index);
            info!(index, "Resuming saved progress");
            self.emit(ProgressEvent::WizardResume {
                timestamp: ProgressEvent::now(),
                index,
                completed,
            });
        } else {
            info!("Starting fresh");
            self.discard_record();
            self.reset_state();
        }
        Ok(())
    }

    fn discard_record(&self) {
        if let Err(e) = self.store.clear() {
            warn!("Failed to clear progress record: {}", e);
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.snapshot()) {
            warn!("Failed to save progress ({}); continuing in memory", e);
        }
    }

    /// Record `index` as done and move past it
    fn complete(&mut self, index: usize) {
        let name = self.steps[index].name().to_string();
        if !self.completed.contains(&name) {
            self.completed.push(name);
        }
        self.current_index = index + 1;
        self.persist();
    }

    fn finish_step(&mut self, report: StepReport) {
        self.emit(ProgressEvent::StepEnd {
            timestamp: ProgressEvent::now(),
            name: report.name.clone(),
            duration_ms: report.duration_ms,
            success: report.status != StepStatus::Failed,
            message: report.reason.clone(),
        });
        self.summary.add_step(report);
    }

    fn end(&mut self, success: bool) {
        self.emit(ProgressEvent::WizardEnd {
            timestamp: ProgressEvent::now(),
            success,
            completed: self.completed.len(),
            total: self.steps.len(),
        });
    }

    async fn drive(&mut self, reset: bool) -> Result<()> {
        self.decide_resume(reset).await?;

        let total = self.steps.len();
        let mut attempt: u32 = 0;
        let mut attempt_index = None;
        let mut started = Instant::now();

        while self.current_index < total {
            let index = self.current_index;
            if attempt_index != Some(index) {
                attempt_index = Some(index);
                attempt = 0;
                started = Instant::now();
            }
            attempt += 1;

            let name = self.steps[index].name().to_string();
            let title = self.steps[index].title().to_string();
            info!(step = %name, attempt, "Step {}/{}: {}", index + 1, total, title);
            self.emit(ProgressEvent::StepBegin {
                timestamp: ProgressEvent::now(),
                index,
                total,
                name: name.clone(),
                title,
                attempt,
            });

            self.active = Some(index);
            let check = self.steps[index].check(&self.context).await;
            if check.is_some_and(|c| c.allows_skip()) {
                self.active = None;
                let reason = "already set up".to_string();
                info!(step = %name, "Skipping: {}", reason);
                self.emit(ProgressEvent::StepSkip {
                    timestamp: ProgressEvent::now(),
                    name: name.clone(),
                    reason: reason.clone(),
                });
                self.complete(index);
                self.finish_step(StepReport {
                    name,
                    status: StepStatus::Skipped,
                    attempts: attempt,
                    reason: Some(reason),
                    duration_ms: elapsed_ms(started),
                });
                continue;
            }

            let outcome = self.steps[index].run(&self.context).await;
            self.active = None;

            let result = match outcome {
                Ok(result) => result,
                Err(source) if is_prompt_interrupt(&source) => {
                    self.active = Some(index);
                    self.interrupt().await;
                    return Err(SetupError::Interrupted);
                }
                Err(source) => {
                    error!(step = %name, "Step crashed: {:#}", source);
                    if let Err(e) = self.steps[index].cleanup(&self.context).await {
                        warn!(step = %name, "Cleanup after crash failed: {:#}", e);
                    }
                    self.finish_step(StepReport {
                        name: name.clone(),
                        status: StepStatus::Failed,
                        attempts: attempt,
                        reason: Some(format!("{:#}", source)),
                        duration_ms: elapsed_ms(started),
                    });
                    self.end(false);
                    return Err(SetupError::StepCrashed { step: name, source });
                }
            };

            match result.disposition() {
                Disposition::Retry => {
                    debug!(step = %name, reason = ?result.message, "Step asked to retry");
                    self.emit(ProgressEvent::StepRetry {
                        timestamp: ProgressEvent::now(),
                        name,
                        attempt,
                        reason: result.message,
                    });
                }
                Disposition::Abort => {
                    let reason = result
                        .message
                        .unwrap_or_else(|| "step reported failure".to_string());
                    error!(step = %name, "Step failed: {}", reason);
                    self.finish_step(StepReport {
                        name: name.clone(),
                        status: StepStatus::Failed,
                        attempts: attempt,
                        reason: Some(reason.clone()),
                        duration_ms: elapsed_ms(started),
                    });
                    self.end(false);
                    return Err(SetupError::StepFailed { step: name, reason });
                }
                Disposition::Advance => {
                    if let Some(data) = result.data {
                        self.context.merge(data);
                    }
                    let status = if result.skip {
                        StepStatus::Skipped
                    } else {
                        StepStatus::Executed
                    };
                    self.complete(index);
                    self.finish_step(StepReport {
                        name,
                        status,
                        attempts: attempt,
                        reason: result.message,
                        duration_ms: elapsed_ms(started),
                    });
                }
            }
        }

        if let Err(e) = self.store.clear() {
            warn!("Failed to remove progress record after completion: {}", e);
        }
        info!("All {} steps complete", total);
        self.end(true);
        Ok(())
    }

    /// Release resources after the loop was abandoned mid-step
    #[instrument(skip_all)]
    async fn interrupt(&mut self) {
        warn!("Setup interrupted; cleaning up");

        let mut order: Vec<usize> = self.active.take().into_iter().collect();
        let owners = (0..self.steps.len())
            .rev()
            .filter(|&i| self.steps[i].owns_resources() && i < self.current_index);
        for index in owners {
            if !order.contains(&index) {
                order.push(index);
            }
        }

        for index in order {
            let step = &self.steps[index];
            debug!(step = %step.name(), "Running interruption cleanup");
            if let Err(e) = step.cleanup(&self.context).await {
                warn!(step = %step.name(), "Cleanup failed: {:#}", e);
            }
        }

        let stopped = self.supervisor.stop_all().await;
        if stopped > 0 {
            info!("Stopped {} background process(es)", stopped);
        }
        self.end(false);
    }

    /// Ask every step to verify itself, in order
    pub async fn verify_all(&self) -> Vec<StepVerification> {
        let mut results = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let verification = match step.kind() {
                StepKind::Attestation => None,
                StepKind::Automated => step.verify(&self.context).await,
            };
            results.push(StepVerification {
                name: step.name().to_string(),
                title: step.title().to_string(),
                kind: step.kind(),
                verification,
            });
        }
        results
    }
}

fn is_prompt_interrupt(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<PromptError>(),
        Some(PromptError::Interrupted)
    )
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
