//! Progress record persistence
//!
//! Exactly one progress record lives at a well-known path. It is rewritten
//! after every completed step and removed once the pipeline finishes.
//!
//! Corrupted or unreadable records are treated as missing so the wizard starts
//! fresh instead of failing.

use crate::context::Context;
use crate::errors::PersistenceError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Schema version written into every record
pub const RECORD_VERSION: &str = "1.0";

/// Default progress file name, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = ".devsetup-progress.json";

/// Snapshot of engine position and context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub current_state_index: usize,
    pub completed_states: Vec<String>,
    pub context: Context,
}

impl ProgressRecord {
    /// Build a record stamped with the current schema version and time
    pub fn new(current_state_index: usize, completed_states: Vec<String>, context: Context) -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            timestamp: Utc::now(),
            current_state_index,
            completed_states,
            context,
        }
    }
}

/// Why a record on disk can or cannot be used
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValidation {
    /// Record is usable
    Valid,
    /// File does not exist
    Missing,
    /// File is empty or whitespace
    Empty,
    /// Not JSON, or not a JSON object
    InvalidJson(String),
    /// Required fields missing or of the wrong type
    MissingFields(String),
    /// File exists but cannot be read
    Unreadable(String),
}

impl RecordValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, RecordValidation::Valid)
    }

    /// Human-readable description of the problem
    pub fn description(&self) -> &str {
        match self {
            RecordValidation::Valid => "valid",
            RecordValidation::Missing => "file does not exist",
            RecordValidation::Empty => "file is empty",
            RecordValidation::InvalidJson(_) => "invalid JSON",
            RecordValidation::MissingFields(_) => "missing required fields",
            RecordValidation::Unreadable(_) => "file unreadable",
        }
    }
}

const REQUIRED_FIELDS: [&str; 5] = [
    "version",
    "timestamp",
    "currentStateIndex",
    "completedStates",
    "context",
];

/// Durable storage for the single progress record
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inspect the file on disk without deserializing it into a record
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn validate(&self) -> RecordValidation {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return RecordValidation::Missing;
            }
            Err(e) => return RecordValidation::Unreadable(e.to_string()),
        };

        if content.trim().is_empty() {
            return RecordValidation::Empty;
        }

        let value: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => return RecordValidation::InvalidJson(e.to_string()),
        };

        let Some(obj) = value.as_object() else {
            return RecordValidation::InvalidJson("not a JSON object".to_string());
        };

        let missing: Vec<&str> = REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !obj.contains_key(*field))
            .collect();
        if !missing.is_empty() {
            return RecordValidation::MissingFields(format!("missing: {}", missing.join(", ")));
        }

        if !obj["context"].is_object() {
            return RecordValidation::MissingFields("context is not an object".to_string());
        }

        RecordValidation::Valid
    }

    /// Read the record. Missing, corrupted or unreadable files yield `None`.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> Option<ProgressRecord> {
        let validation = self.validate();
        match &validation {
            RecordValidation::Valid => {}
            RecordValidation::Missing => {
                debug!("No progress record found");
                return None;
            }
            other => {
                warn!(
                    "Progress record at {} is unusable ({}). Starting fresh.",
                    self.path.display(),
                    other.description()
                );
                return None;
            }
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                warn!("Cannot read progress record: {}. Starting fresh.", e);
                return None;
            }
        };

        match serde_json::from_str::<ProgressRecord>(&content) {
            Ok(record) => {
                debug!(
                    index = record.current_state_index,
                    completed = record.completed_states.len(),
                    "Loaded progress record"
                );
                Some(record)
            }
            Err(e) => {
                warn!(
                    "Failed to deserialize progress record at {}: {}. Starting fresh.",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Write the record: temp file first, then rename over the old one
    #[instrument(skip_all, fields(path = %self.path.display(), index = record.current_state_index))]
    pub fn save(&self, record: &ProgressRecord) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }

        let content = serde_json::to_string_pretty(record)?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content).map_err(|source| PersistenceError::Io {
            path: temp_path.display().to_string(),
            source,
        })?;
        std::fs::rename(&temp_path, &self.path).map_err(|source| PersistenceError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        debug!("Progress record saved");
        Ok(())
    }

    /// Remove the record; a missing file is fine
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn clear(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Progress record cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }
}

impl Default for ProgressStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}
