//! Command implementations
//!
//! `setup` runs the wizard; `verify` checks an existing setup without
//! changing anything.

pub mod setup;
pub mod verify;

/// Fatal step failure or uncaught error
pub const EXIT_FAILURE: u8 = 1;

/// Interrupted by Ctrl+C
pub const EXIT_INTERRUPTED: u8 = 130;
