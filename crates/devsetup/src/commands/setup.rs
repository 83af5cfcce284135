//! Setup command implementation
//!
//! Wires the real capabilities (terminal prompts, system commands, TCP
//! probes) into the step pipeline and drives it with the engine until it
//! finishes or Ctrl+C arrives.

use super::{EXIT_FAILURE, EXIT_INTERRUPTED};
use crate::steps::{build_pipeline, StepDeps, SyncServer};
use crate::ui;
use crate::ui::spinner::StepHeaderEmitter;
use crate::ui::summary::render_run;
use anyhow::{Context as _, Result};
use console::style;
use devsetup_core::command::SystemCommandRunner;
use devsetup_core::config::WizardConfig;
use devsetup_core::context::ContextKey;
use devsetup_core::engine::SetupEngine;
use devsetup_core::errors::SetupError;
use devsetup_core::network::TcpProber;
use devsetup_core::persistence::ProgressStore;
use devsetup_core::process::ProcessSupervisor;
use devsetup_core::progress::{FanoutEmitter, JsonFileEmitter};
use devsetup_core::prompt::{Prompt, TerminalPrompt};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Setup command arguments
#[derive(Debug, Clone)]
pub struct SetupArgs {
    pub config: WizardConfig,
    /// Ignore saved progress
    pub reset: bool,
    /// JSON-lines progress event file
    pub progress_file: Option<PathBuf>,
}

/// Engine plus the handles the command needs after the run
pub(crate) struct Wizard {
    pub engine: SetupEngine,
    pub server: Arc<SyncServer>,
    pub supervisor: Arc<ProcessSupervisor>,
}

/// Build the engine over the full pipeline with real capabilities
pub(crate) fn build_wizard(config: &WizardConfig) -> Result<Wizard> {
    config.validate()?;

    let supervisor = Arc::new(ProcessSupervisor::with_grace(
        config.sync_server.stop_grace(),
    ));
    let prompt: Arc<dyn Prompt> = Arc::new(TerminalPrompt::new());
    let server = Arc::new(SyncServer::new(
        config.sync_server.clone(),
        supervisor.clone(),
        Arc::new(TcpProber::new()),
    ));
    let working_dir = std::env::current_dir().context("Failed to determine working directory")?;

    let deps = StepDeps {
        config: config.clone(),
        prompt: prompt.clone(),
        runner: Arc::new(SystemCommandRunner::new()),
        server: server.clone(),
        working_dir,
    };
    let store = ProgressStore::new(config.state_file.clone());
    let engine = SetupEngine::new(build_pipeline(&deps), store, prompt, supervisor.clone())?;

    Ok(Wizard {
        engine,
        server,
        supervisor,
    })
}

/// Execute the setup command
#[instrument(skip(args))]
pub async fn execute(args: SetupArgs) -> Result<ExitCode> {
    debug!("Setup args: {:?}", args);
    let Wizard {
        engine,
        server,
        supervisor,
    } = build_wizard(&args.config)?;

    let mut emitter = FanoutEmitter::new();
    emitter.push(Box::new(StepHeaderEmitter::new()));
    if let Some(path) = &args.progress_file {
        let file = JsonFileEmitter::new(path)
            .with_context(|| format!("Failed to open progress file {}", path.display()))?;
        emitter.push(Box::new(file));
    }
    let mut engine = engine.with_emitter(Box::new(emitter));

    let outcome = engine
        .run_until(args.reset, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    match outcome {
        Ok(summary) => {
            println!("{}", render_run(&summary, false));
            if server.is_running() {
                let port = engine.context().port(ContextKey::ServerPort);
                serve_until_interrupted(&supervisor, port).await;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(SetupError::Interrupted) => {
            ui::say("");
            println!("{}", render_run(engine.summary(), true));
            info!("Exiting after interruption");
            // A terminal prompt may still hold a blocking thread; do not wait for it
            std::process::exit(i32::from(EXIT_INTERRUPTED));
        }
        Err(err @ (SetupError::StepFailed { .. } | SetupError::StepCrashed { .. })) => {
            // The record stays; background processes do not outlive the wizard
            supervisor.stop_all().await;
            println!("{}", render_run(engine.summary(), true));
            eprintln!("{} {}", style("Error:").red().bold(), err);
            if engine.store().path().exists() {
                ui::hint("Progress is saved. Fix the problem and run devsetup again to continue.");
            }
            Ok(ExitCode::from(EXIT_FAILURE))
        }
        Err(other) => Err(other.into()),
    }
}

/// Keep the sync server up for the Studio session, then stop it on Ctrl+C
async fn serve_until_interrupted(supervisor: &ProcessSupervisor, port: Option<u16>) {
    let location = port
        .map(|p| format!(" on port {}", p))
        .unwrap_or_default();
    ui::say(format!(
        "{} The sync server keeps running{}. Press Ctrl+C to stop it.",
        style("→").cyan().bold(),
        location
    ));
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
    let stopped = supervisor.stop_all().await;
    debug!("Stopped {} background process(es)", stopped);
    ui::say("Sync server stopped. Happy building!");
}
