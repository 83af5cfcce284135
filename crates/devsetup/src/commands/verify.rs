//! Verify command implementation
//!
//! Loads the saved context (without prompting) and asks every step to verify
//! itself. Nothing is installed or started.

use super::setup::build_wizard;
use super::EXIT_FAILURE;
use crate::ui;
use crate::ui::summary::{all_verified, render_verification};
use anyhow::Result;
use devsetup_core::config::WizardConfig;
use std::process::ExitCode;
use tracing::{debug, instrument};

/// Verify command arguments
#[derive(Debug, Clone)]
pub struct VerifyArgs {
    pub config: WizardConfig,
}

/// Execute the verify command
#[instrument(skip(args))]
pub async fn execute(args: VerifyArgs) -> Result<ExitCode> {
    let mut wizard = build_wizard(&args.config)?;

    match wizard.engine.store().load() {
        Some(record) => {
            debug!(index = record.current_state_index, "Verifying against saved progress");
            wizard.engine.restore(record);
        }
        None => ui::hint("No saved progress found; verifying the machine as is."),
    }

    let results = wizard.engine.verify_all().await;
    println!("{}", render_verification(&results));

    if all_verified(&results) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILURE))
    }
}
