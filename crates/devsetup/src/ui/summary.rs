//! End-of-run reports
//!
//! Text goes to stdout. Status lines follow the pipeline order.

use console::style;
use devsetup_core::engine::{RunSummary, StepStatus, StepVerification};
use devsetup_core::step::StepKind;

/// Render the steps processed in this run.
///
/// `resume_required` marks a run that stopped early with progress saved.
///
/// ```text
/// Setup Summary
///   [OK] editor: executed
///   [--] toolchain: skipped (already set up)
///   [X] sync-tool: FAILED (Rojo is required)
///
/// Setup incomplete: 1 executed, 1 skipped, 1 failed
/// ```
pub fn render_run(summary: &RunSummary, resume_required: bool) -> String {
    let mut output = String::new();
    let header = if summary.resumed {
        format!(
            "Setup Summary (resumed at step {})",
            summary.resumed_from.map(|i| i + 1).unwrap_or(1)
        )
    } else {
        "Setup Summary".to_string()
    };
    output.push_str(&format!("{}\n", style(header).bold()));

    for report in &summary.steps {
        let (icon, status) = match report.status {
            StepStatus::Executed => (
                style("[OK]").green().to_string(),
                style("executed").green().to_string(),
            ),
            StepStatus::Skipped => (
                style("[--]").yellow().to_string(),
                style("skipped").yellow().to_string(),
            ),
            StepStatus::Failed => (
                style("[X]").red().to_string(),
                style("FAILED").red().bold().to_string(),
            ),
        };
        let attempts = if report.attempts > 1 {
            format!(" after {} attempts", report.attempts)
        } else {
            String::new()
        };
        let reason = report
            .reason
            .as_ref()
            .map(|r| format!(" ({})", style(r).italic()))
            .unwrap_or_default();
        output.push_str(&format!(
            "  {} {}: {}{}{}\n",
            icon, report.name, status, attempts, reason
        ));
    }

    let executed = summary.executed_steps().len();
    let skipped = summary.skipped_steps().len();
    let failed = summary.failed_steps().len();
    let message = if failed > 0 {
        style(format!(
            "Setup incomplete: {} executed, {} skipped, {} failed",
            executed, skipped, failed
        ))
        .red()
    } else if resume_required {
        style(format!(
            "Setup interrupted: {} executed, {} skipped. Run again to resume.",
            executed, skipped
        ))
        .yellow()
    } else {
        style(format!(
            "Setup complete: {} executed, {} skipped",
            executed, skipped
        ))
        .green()
    };
    output.push_str(&format!("\n{}\n", message));
    output
}

/// Whether every self-verifying step passed. Steps that cannot verify
/// themselves do not count against the result.
pub fn all_verified(results: &[StepVerification]) -> bool {
    results
        .iter()
        .filter_map(|r| r.verification.as_ref())
        .all(|v| v.verified)
}

/// Render a `--verify` report
pub fn render_verification(results: &[StepVerification]) -> String {
    let mut output = format!("{}\n", style("Verification Report").bold());
    for result in results {
        match (&result.verification, result.kind) {
            (Some(v), _) if v.verified => {
                output.push_str(&format!(
                    "  {} {}: {}\n",
                    style("[OK]").green(),
                    result.title,
                    style("verified").green()
                ));
            }
            (Some(v), _) => {
                output.push_str(&format!(
                    "  {} {}: {}\n",
                    style("[X]").red(),
                    result.title,
                    style("NOT VERIFIED").red().bold()
                ));
                for issue in &v.issues {
                    output.push_str(&format!("      - {}\n", issue));
                }
            }
            (None, StepKind::Attestation) => {
                output.push_str(&format!(
                    "  {} {}: {}\n",
                    style("[..]").dim(),
                    result.title,
                    style("needs you to confirm it by running setup").dim()
                ));
            }
            (None, StepKind::Automated) => {
                output.push_str(&format!(
                    "  {} {}: {}\n",
                    style("[..]").dim(),
                    result.title,
                    style("nothing recorded to verify").dim()
                ));
            }
        }
    }

    let message = if all_verified(results) {
        style("Everything checks out".to_string()).green()
    } else {
        style("Some steps need attention; run devsetup to fix them".to_string()).red()
    };
    output.push_str(&format!("\n{}\n", message));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use devsetup_core::engine::StepReport;
    use devsetup_core::step::Verification;

    fn report(name: &str, status: StepStatus, attempts: u32, reason: Option<&str>) -> StepReport {
        StepReport {
            name: name.to_string(),
            status,
            attempts,
            reason: reason.map(str::to_string),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_run_summary_lists_steps_in_order() {
        let mut summary = RunSummary::new();
        summary.add_step(report("editor", StepStatus::Executed, 2, None));
        summary.add_step(report(
            "toolchain",
            StepStatus::Skipped,
            1,
            Some("already set up"),
        ));

        let text = render_run(&summary, false);
        let editor = text.find("editor").unwrap();
        let toolchain = text.find("toolchain").unwrap();
        assert!(editor < toolchain);
        assert!(text.contains("after 2 attempts"));
        assert!(text.contains("already set up"));
        assert!(text.contains("Setup complete: 1 executed, 1 skipped"));
    }

    #[test]
    fn test_failed_run_is_incomplete() {
        let mut summary = RunSummary::new();
        summary.add_step(report("welcome", StepStatus::Failed, 1, Some("setup declined")));
        let text = render_run(&summary, true);
        assert!(text.contains("FAILED"));
        assert!(text.contains("Setup incomplete: 0 executed, 0 skipped, 1 failed"));
    }

    #[test]
    fn test_interrupted_run_mentions_resume() {
        let mut summary = RunSummary::new();
        summary.resumed = true;
        summary.resumed_from = Some(3);
        summary.add_step(report("project", StepStatus::Executed, 1, None));
        let text = render_run(&summary, true);
        assert!(text.contains("resumed at step 4"));
        assert!(text.contains("Run again to resume"));
    }

    #[test]
    fn test_verification_report() {
        let results = vec![
            StepVerification {
                name: "editor".to_string(),
                title: "Visual Studio Code".to_string(),
                kind: StepKind::Automated,
                verification: Some(Verification::ok()),
            },
            StepVerification {
                name: "sync-server".to_string(),
                title: "Sync server".to_string(),
                kind: StepKind::Automated,
                verification: Some(Verification::failed(vec![
                    "nothing is listening on port 34872".to_string(),
                ])),
            },
            StepVerification {
                name: "connect".to_string(),
                title: "Connect Studio".to_string(),
                kind: StepKind::Attestation,
                verification: None,
            },
        ];

        assert!(!all_verified(&results));
        let text = render_verification(&results);
        assert!(text.contains("NOT VERIFIED"));
        assert!(text.contains("- nothing is listening on port 34872"));
        assert!(text.contains("needs you to confirm"));
        assert!(all_verified(&results[..1]));
        assert!(all_verified(&results[2..]));
    }
}
