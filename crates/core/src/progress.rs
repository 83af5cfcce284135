//! Progress event streaming
//!
//! The engine reports what it is doing as structured [`ProgressEvent`]s. An
//! emitter decides where they go: a JSON-lines file for tooling, the terminal
//! for humans, or nowhere.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// Engine progress events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// A saved record was accepted and the pipeline continues from it
    #[serde(rename = "wizard.resume")]
    WizardResume {
        timestamp: u64,
        index: usize,
        completed: Vec<String>,
    },
    /// A step is about to be checked and run
    #[serde(rename = "step.begin")]
    StepBegin {
        timestamp: u64,
        index: usize,
        total: usize,
        name: String,
        title: String,
        attempt: u32,
    },
    /// The presence check allowed skipping `run`
    #[serde(rename = "step.skip")]
    StepSkip {
        timestamp: u64,
        name: String,
        reason: String,
    },
    /// The step asked to be re-run
    #[serde(rename = "step.retry")]
    StepRetry {
        timestamp: u64,
        name: String,
        attempt: u32,
        reason: Option<String>,
    },
    /// The step finished, successfully or not
    #[serde(rename = "step.end")]
    StepEnd {
        timestamp: u64,
        name: String,
        duration_ms: u64,
        success: bool,
        message: Option<String>,
    },
    /// The pipeline stopped
    #[serde(rename = "wizard.end")]
    WizardEnd {
        timestamp: u64,
        success: bool,
        completed: usize,
        total: usize,
    },
}

impl ProgressEvent {
    /// Milliseconds since the Unix epoch
    pub fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// The step this event is about, if any
    pub fn step_name(&self) -> Option<&str> {
        match self {
            ProgressEvent::StepBegin { name, .. }
            | ProgressEvent::StepSkip { name, .. }
            | ProgressEvent::StepRetry { name, .. }
            | ProgressEvent::StepEnd { name, .. } => Some(name),
            ProgressEvent::WizardResume { .. } | ProgressEvent::WizardEnd { .. } => None,
        }
    }
}

/// Sink for progress events
pub trait ProgressEmitter: Send + Sync + std::fmt::Debug {
    fn emit(&mut self, event: &ProgressEvent) -> Result<()>;
}

/// Writes events as JSON lines to a file
#[derive(Debug)]
pub struct JsonFileEmitter {
    writer: BufWriter<File>,
}

impl JsonFileEmitter {
    /// Open (append) the progress file, creating parent directories
    pub fn new(file_path: &Path) -> Result<Self> {
        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ProgressEmitter for JsonFileEmitter {
    #[instrument(level = "trace", skip_all)]
    fn emit(&mut self, event: &ProgressEvent) -> Result<()> {
        let line = serde_json::to_string(event)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        debug!("Emitted progress event to file");
        Ok(())
    }
}

/// Forwards every event to several emitters
#[derive(Debug, Default)]
pub struct FanoutEmitter {
    emitters: Vec<Box<dyn ProgressEmitter>>,
}

impl FanoutEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, emitter: Box<dyn ProgressEmitter>) {
        self.emitters.push(emitter);
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

impl ProgressEmitter for FanoutEmitter {
    fn emit(&mut self, event: &ProgressEvent) -> Result<()> {
        for emitter in &mut self.emitters {
            emitter.emit(event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_event_serialization_uses_dotted_type() {
        let event = ProgressEvent::StepSkip {
            timestamp: 1,
            name: "editor".to_string(),
            reason: "already installed".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "step.skip");
        assert_eq!(json["name"], "editor");
        assert_eq!(event.step_name(), Some("editor"));
    }

    #[test]
    fn test_json_file_emitter_writes_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress/events.jsonl");
        let mut emitter = JsonFileEmitter::new(&path).unwrap();

        emitter
            .emit(&ProgressEvent::WizardEnd {
                timestamp: ProgressEvent::now(),
                success: true,
                completed: 3,
                total: 3,
            })
            .unwrap();
        emitter
            .emit(&ProgressEvent::StepRetry {
                timestamp: 2,
                name: "sync-server".to_string(),
                attempt: 2,
                reason: None,
            })
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: ProgressEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.step_name(), Some("sync-server"));
    }

    #[test]
    fn test_fanout_reaches_every_emitter() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.jsonl");
        let second = dir.path().join("b.jsonl");

        let mut fanout = FanoutEmitter::new();
        assert!(fanout.is_empty());
        fanout.push(Box::new(JsonFileEmitter::new(&first).unwrap()));
        fanout.push(Box::new(JsonFileEmitter::new(&second).unwrap()));
        fanout
            .emit(&ProgressEvent::WizardResume {
                timestamp: 1,
                index: 2,
                completed: vec!["welcome".to_string(), "editor".to_string()],
            })
            .unwrap();

        for path in [first, second] {
            let content = std::fs::read_to_string(path).unwrap();
            assert!(content.contains("\"wizard.resume\""));
        }
    }
}
