//! Step unit contract
//!
//! Every pipeline stage implements [`Step`]. The engine only ever sees this
//! trait: what a step installs, asks or launches is its own business.

use crate::context::Context;
use crate::errors::StepError;
use async_trait::async_trait;
use std::collections::HashSet;

/// Result of a cheap presence probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckOutcome {
    /// The thing this step sets up already exists
    pub found: bool,
    /// What was found can be trusted without running the step
    pub can_skip: bool,
}

impl CheckOutcome {
    /// Found and trusted: the engine will skip `run`
    pub fn skippable() -> Self {
        Self {
            found: true,
            can_skip: true,
        }
    }

    /// Found, but the step must still run (e.g. to reconfigure)
    pub fn found() -> Self {
        Self {
            found: true,
            can_skip: false,
        }
    }

    /// Nothing there yet
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn allows_skip(&self) -> bool {
        self.found && self.can_skip
    }
}

/// Result of a deep, functional verification
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Verification {
    pub verified: bool,
    pub issues: Vec<String>,
}

impl Verification {
    pub fn ok() -> Self {
        Self {
            verified: true,
            issues: Vec::new(),
        }
    }

    pub fn failed(issues: Vec<String>) -> Self {
        Self {
            verified: false,
            issues,
        }
    }

    /// Verified exactly when no issue was collected
    pub fn from_issues(issues: Vec<String>) -> Self {
        Self {
            verified: issues.is_empty(),
            issues,
        }
    }
}

/// What a step's `run` reports back to the engine
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepResult {
    pub success: bool,
    /// Re-run this step from the top; takes precedence over every other field
    pub retry: bool,
    /// The step decided there was nothing to do
    pub skip: bool,
    /// Merged into the context only when `success` is true
    pub data: Option<Context>,
    /// Human-readable reason, used for failure reporting
    pub message: Option<String>,
}

impl StepResult {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn success_with(data: Context) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            skip: true,
            message: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn retry(reason: impl Into<String>) -> Self {
        Self {
            retry: true,
            message: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            message: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Attach data to any result (it is still discarded unless successful)
    pub fn with_data(mut self, data: Context) -> Self {
        self.data = Some(data);
        self
    }

    /// How the engine must react to this result
    pub fn disposition(&self) -> Disposition {
        if self.retry {
            Disposition::Retry
        } else if self.success {
            Disposition::Advance
        } else {
            Disposition::Abort
        }
    }
}

/// Engine reaction derived from a [`StepResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Same step again, position unchanged, nothing persisted
    Retry,
    /// Merge data, persist, move on
    Advance,
    /// Stop the pipeline
    Abort,
}

/// How a step's outcome is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepKind {
    /// Success is decided by the step's own probes and return values
    #[default]
    Automated,
    /// Success hinges on a human confirming what they see
    Attestation,
}

/// One stage of the setup pipeline
#[async_trait]
pub trait Step: Send + Sync {
    /// Stable, unique name used as the resume key
    fn name(&self) -> &str;

    /// Short title for display
    fn title(&self) -> &str {
        self.name()
    }

    fn kind(&self) -> StepKind {
        StepKind::Automated
    }

    /// Whether the step holds long-lived resources (background processes)
    /// that must be released on interruption even after it completed
    fn owns_resources(&self) -> bool {
        false
    }

    /// Cheap, side-effect free presence probe. `None` means "no check".
    async fn check(&self, _ctx: &Context) -> Option<CheckOutcome> {
        None
    }

    /// Deep verification. `None` means the step cannot verify itself.
    async fn verify(&self, _ctx: &Context) -> Option<Verification> {
        None
    }

    /// Do the step's work.
    async fn run(&self, ctx: &Context) -> anyhow::Result<StepResult>;

    /// Release anything the step acquired. Must tolerate `run` never having
    /// executed.
    async fn cleanup(&self, _ctx: &Context) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Validate a step list: non-empty, every name non-empty and unique
pub fn validate_steps(steps: &[Box<dyn Step>]) -> Result<(), StepError> {
    if steps.is_empty() {
        return Err(StepError::EmptyPipeline);
    }

    let mut seen = HashSet::new();
    for (index, step) in steps.iter().enumerate() {
        let name = step.name();
        if name.trim().is_empty() {
            return Err(StepError::EmptyName { index });
        }
        if !seen.insert(name) {
            return Err(StepError::DuplicateName {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Step for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn run(&self, _ctx: &Context) -> anyhow::Result<StepResult> {
            Ok(StepResult::success())
        }
    }

    fn steps(names: &[&'static str]) -> Vec<Box<dyn Step>> {
        names
            .iter()
            .map(|n| Box::new(Named(n)) as Box<dyn Step>)
            .collect()
    }

    #[test]
    fn test_validate_accepts_unique_names() {
        assert!(validate_steps(&steps(&["welcome", "editor", "project"])).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_pipeline() {
        assert!(matches!(
            validate_steps(&[]),
            Err(StepError::EmptyPipeline)
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_blank_names() {
        match validate_steps(&steps(&["editor", "project", "editor"])) {
            Err(StepError::DuplicateName { name }) => assert_eq!(name, "editor"),
            other => panic!("expected duplicate error, got {:?}", other),
        }
        assert!(matches!(
            validate_steps(&steps(&["editor", " "])),
            Err(StepError::EmptyName { index: 1 })
        ));
    }

    #[test]
    fn test_retry_wins_over_success() {
        let result = StepResult {
            success: true,
            retry: true,
            ..Default::default()
        };
        assert_eq!(result.disposition(), Disposition::Retry);
        assert_eq!(StepResult::success().disposition(), Disposition::Advance);
        assert_eq!(StepResult::fatal("no").disposition(), Disposition::Abort);
        assert_eq!(StepResult::skipped("done").disposition(), Disposition::Advance);
    }

    #[test]
    fn test_check_outcome_skip_requires_both_flags() {
        assert!(CheckOutcome::skippable().allows_skip());
        assert!(!CheckOutcome::found().allows_skip());
        assert!(!CheckOutcome::missing().allows_skip());
        assert!(!CheckOutcome {
            found: false,
            can_skip: true
        }
        .allows_skip());
    }

    #[test]
    fn test_verification_from_issues() {
        assert!(Verification::from_issues(vec![]).verified);
        let v = Verification::from_issues(vec!["port closed".to_string()]);
        assert!(!v.verified);
        assert_eq!(v.issues.len(), 1);
    }
}
