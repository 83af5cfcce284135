//! Project creation
//!
//! Asks for a project name and runs `rojo init` in a directory of that name.
//! A directory that already holds a Rojo project file can be adopted as is.

use super::{recover, Recovery, StepDeps};
use crate::ui;
use anyhow::Context as _;
use async_trait::async_trait;
use devsetup_core::command::CommandRunner;
use devsetup_core::context::{Context, ContextKey};
use devsetup_core::prompt::{InputValidator, Prompt};
use devsetup_core::step::{CheckOutcome, Step, StepResult, Verification};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Rojo project file created by `rojo init`
pub const PROJECT_FILE: &str = "default.project.json";

const DEFAULT_PROJECT_NAME: &str = "my-game";

/// Letter first, then letters, digits, `-` or `_`; at most 50 characters
const PROJECT_NAME_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9_-]{0,49}$";

fn name_validator() -> anyhow::Result<InputValidator> {
    let pattern = Regex::new(PROJECT_NAME_PATTERN)?;
    Ok(Arc::new(move |value: &str| {
        if pattern.is_match(value.trim()) {
            Ok(())
        } else {
            Err("Use letters, digits, '-' or '_', starting with a letter (max 50)".to_string())
        }
    }))
}

fn has_project_file(dir: &Path) -> bool {
    dir.join(PROJECT_FILE).is_file()
}

/// Creates (or adopts) the Rojo project
pub struct ProjectStep {
    sync_tool: String,
    projects_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
    prompt: Arc<dyn Prompt>,
}

impl ProjectStep {
    pub fn new(deps: &StepDeps) -> Self {
        Self {
            sync_tool: deps.config.tools.sync_tool.clone(),
            projects_dir: deps.projects_dir(),
            runner: deps.runner.clone(),
            prompt: deps.prompt.clone(),
        }
    }

    fn created(name: &str, dir: &Path) -> StepResult {
        StepResult::success_with(
            Context::new()
                .with(ContextKey::ProjectName, name)
                .with(ContextKey::ProjectPath, dir.display().to_string()),
        )
    }
}

#[async_trait]
impl Step for ProjectStep {
    fn name(&self) -> &str {
        "project"
    }

    fn title(&self) -> &str {
        "Rojo project"
    }

    async fn check(&self, ctx: &Context) -> Option<CheckOutcome> {
        let path = ctx.string(ContextKey::ProjectPath)?;
        if has_project_file(Path::new(path)) {
            Some(CheckOutcome::skippable())
        } else {
            Some(CheckOutcome::missing())
        }
    }

    async fn verify(&self, ctx: &Context) -> Option<Verification> {
        let path = ctx.string(ContextKey::ProjectPath)?;
        Some(if has_project_file(Path::new(path)) {
            Verification::ok()
        } else {
            Verification::failed(vec![format!("{} has no {}", path, PROJECT_FILE)])
        })
    }

    #[instrument(skip_all)]
    async fn run(&self, _ctx: &Context) -> anyhow::Result<StepResult> {
        let name = self
            .prompt
            .input(
                "Project name",
                Some(DEFAULT_PROJECT_NAME),
                Some(name_validator()?),
            )
            .await?;
        let name = name.trim().to_string();
        let dir = self.projects_dir.join(&name);
        debug!(dir = %dir.display(), "Project directory chosen");

        if has_project_file(&dir) {
            let question = format!("{} already holds a Rojo project. Use it?", dir.display());
            if self.prompt.confirm(&question, true).await? {
                return Ok(Self::created(&name, &dir));
            }
            return Ok(StepResult::retry("existing project declined"));
        }

        let occupied = dir.is_dir()
            && std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?
                .next()
                .is_some();
        if occupied {
            ui::warn(format!(
                "{} exists and is not empty; pick another name",
                dir.display()
            ));
            return Ok(StepResult::retry("project directory not empty"));
        }

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let output = self
            .runner
            .run(
                &self.sync_tool,
                &["init".to_string(), dir.display().to_string()],
            )
            .await;

        if output.success() && has_project_file(&dir) {
            info!(project = %name, "Project created");
            ui::say(format!("Created project in {}", dir.display()));
            return Ok(Self::created(&name, &dir));
        }

        ui::warn(format!("`{} init` did not create {}", self.sync_tool, PROJECT_FILE));
        if !output.stderr.trim().is_empty() {
            ui::hint(output.stderr.trim());
        }
        recover(
            self.prompt.as_ref(),
            Recovery::RetryOrQuit,
            "project could not be created",
        )
        .await
    }
}
