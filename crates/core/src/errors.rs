//! Error types and handling
//!
//! The taxonomy follows the wizard's failure policy: each domain (steps,
//! persistence, processes, prompts, configuration) has its own enum, and all of
//! them are wrapped by [`SetupError`]. Only fatal step failures, uncaught step
//! errors and interruption escape the engine; persistence and cleanup faults are
//! downgraded to warnings at the call site.

use thiserror::Error;

/// Step registration and contract errors
#[derive(Error, Debug)]
pub enum StepError {
    /// The pipeline has no steps
    #[error("Step list is empty")]
    EmptyPipeline,

    /// A step reported an empty name
    #[error("Step at position {index} has an empty name")]
    EmptyName { index: usize },

    /// Two steps share a name; names are resume keys and must be unique
    #[error("Duplicate step name: {name}")]
    DuplicateName { name: String },
}

/// Progress file errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Progress file could not be read or written
    #[error("Progress file I/O error at {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Progress record could not be serialized
    #[error("Failed to serialize progress record")]
    Serialize(#[from] serde_json::Error),
}

/// Managed background process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// The program could not be spawned
    #[error("Failed to start '{command}': {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A process with this name is already running
    #[error("Process '{name}' is already running")]
    AlreadyRunning { name: String },

    /// The command line was empty or could not be parsed
    #[error("Invalid command line: {message}")]
    InvalidCommand { message: String },
}

/// Interactive prompt errors
#[derive(Error, Debug)]
pub enum PromptError {
    /// The terminal prompt failed (not a TTY, I/O error, ...)
    #[error("Prompt failed: {message}")]
    Terminal { message: String },

    /// The user pressed Ctrl+C while a terminal prompt had the keyboard
    #[error("Prompt interrupted")]
    Interrupted,

    /// A `select` prompt was given no choices
    #[error("Select prompt '{message}' has no choices")]
    NoChoices { message: String },

    /// A scripted prompt ran out of canned answers
    #[error("No scripted answer left for prompt: {message}")]
    Exhausted { message: String },

    /// A scripted answer did not match the prompt kind
    #[error("Scripted answer for '{message}' does not fit a {expected} prompt")]
    UnexpectedAnswer {
        message: String,
        expected: &'static str,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file {path}: {message}")]
    Parsing { path: String, message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Explicitly requested configuration file does not exist
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum SetupError {
    /// Step registration errors
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Process supervision errors
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// Prompt errors
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A step reported an unrecoverable failure (`success: false, retry: false`)
    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// A step returned an error instead of a result
    #[error("Step '{step}' crashed: {source}")]
    StepCrashed {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    /// The wizard was interrupted (Ctrl+C)
    #[error("Setup interrupted")]
    Interrupted,
}

impl SetupError {
    /// Name of the step responsible for this error, if any
    pub fn step_name(&self) -> Option<&str> {
        match self {
            SetupError::StepFailed { step, .. } | SetupError::StepCrashed { step, .. } => {
                Some(step)
            }
            _ => None,
        }
    }
}

/// Convenience type alias for Results with SetupError
pub type Result<T> = std::result::Result<T, SetupError>;
