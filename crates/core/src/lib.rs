//! Core library for the devsetup wizard
//!
//! This crate contains the step contract, the resumable orchestration engine,
//! progress persistence, and the capabilities steps are built from: prompts,
//! command execution, process supervision, network probes and server launch.

pub mod attest;
pub mod command;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod network;
pub mod persistence;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod server;
pub mod step;

// Re-export IndexMap for use by dependent crates (preserves insertion order for ordered maps)
pub use indexmap::IndexMap;

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
