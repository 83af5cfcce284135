//! Terminal output
//!
//! Wizard narration goes to stderr next to the prompts; final reports go to
//! stdout.

pub mod spinner;
pub mod summary;

use console::{style, Term};

/// Print a plain line of narration
pub fn say(message: impl AsRef<str>) {
    let _ = Term::stderr().write_line(message.as_ref());
}

/// Print an indented hint (install URLs, next actions)
pub fn hint(message: impl AsRef<str>) {
    say(format!("  {}", style(message.as_ref()).dim()));
}

/// Print a warning line
pub fn warn(message: impl AsRef<str>) {
    say(format!("  {} {}", style("!").yellow().bold(), message.as_ref()));
}
