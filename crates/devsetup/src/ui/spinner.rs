use super::say;
use anyhow::Result;
use console::style;
use devsetup_core::progress::{ProgressEmitter, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

fn default_style() -> ProgressStyle {
    // Green spinner; message coloring is left to the caller
    ProgressStyle::with_template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

fn finished_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Renders engine events as step headers and outcome lines on stderr.
///
/// No spinner runs between events: steps prompt the user, and a ticking bar
/// would redraw over the question.
#[derive(Debug, Default)]
pub struct StepHeaderEmitter;

impl StepHeaderEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Text for one event, if it is shown at all
    pub fn render(event: &ProgressEvent) -> Option<String> {
        use ProgressEvent::*;
        match event {
            WizardResume { completed, .. } => Some(
                style(format!(
                    "Resuming setup ({} step{} already done)",
                    completed.len(),
                    if completed.len() == 1 { "" } else { "s" }
                ))
                .cyan()
                .to_string(),
            ),
            StepBegin {
                index,
                total,
                title,
                attempt,
                ..
            } => {
                if *attempt > 1 {
                    Some(
                        style(format!("Checking {} again (attempt {})…", title, attempt))
                            .yellow()
                            .to_string(),
                    )
                } else {
                    Some(format!(
                        "\n{}",
                        style(format!("[{}/{}] {}", index + 1, total, title)).bold()
                    ))
                }
            }
            StepSkip { reason, .. } => Some(format!(
                "  {} {}",
                style("✓").green(),
                style(format!("Skipped: {}", reason)).dim()
            )),
            StepEnd {
                success,
                duration_ms,
                message,
                ..
            } => {
                if *success {
                    Some(format!(
                        "  {} {}",
                        style("✓").green(),
                        style(format!("Done in {} ms", duration_ms)).dim()
                    ))
                } else {
                    Some(format!(
                        "  {} {}",
                        style("✗").red(),
                        style(message.as_deref().unwrap_or("failed")).red()
                    ))
                }
            }
            StepRetry { .. } | WizardEnd { .. } => None,
        }
    }
}

impl ProgressEmitter for StepHeaderEmitter {
    fn emit(&mut self, event: &ProgressEvent) -> Result<()> {
        if let Some(line) = Self::render(event) {
            say(line);
        }
        Ok(())
    }
}

/// Simple RAII spinner for wrapping an async operation without events
pub struct PlainSpinner {
    pb: ProgressBar,
    finished: bool,
}

impl PlainSpinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(80));
        pb.set_style(default_style());
        pb.set_message(style(message).yellow().to_string());
        Self {
            pb,
            finished: false,
        }
    }

    pub fn finish_with_message(mut self, message: &str) {
        self.pb.set_style(finished_style());
        self.pb
            .finish_with_message(style(message).green().to_string());
        self.finished = true;
    }

    pub fn fail_with_message(mut self, message: &str) {
        self.pb.set_style(finished_style());
        self.pb.finish_with_message(style(message).red().to_string());
        self.finished = true;
    }
}

impl Drop for PlainSpinner {
    fn drop(&mut self) {
        if !self.finished {
            self.pb.finish_and_clear();
        }
    }
}
