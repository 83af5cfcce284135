//! Wizard configuration
//!
//! Settings live in an optional TOML file. Every field has a default, so a
//! missing file simply means "use the defaults". The file is located with this
//! precedence:
//!
//! 1. An explicit path (the `--config` flag)
//! 2. The `DEVSETUP_CONFIG` environment variable
//! 3. `./devsetup.toml` in the working directory
//! 4. `devsetup.toml` in the user configuration directory
//!
//! An explicitly named file (1 or 2) must exist; discovered ones (3, 4) are
//! optional.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

/// Environment variable naming a configuration file
pub const CONFIG_ENV: &str = "DEVSETUP_CONFIG";

/// Configuration file name searched in the working and user config directories
pub const CONFIG_FILE_NAME: &str = "devsetup.toml";

/// Default sync server port
pub const DEFAULT_SERVER_PORT: u16 = 34872;

/// Top-level wizard settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WizardConfig {
    /// Progress record location
    pub state_file: PathBuf,
    /// Editor extension identifier installed by the `extension` step
    pub extension_id: String,
    /// Directory new projects are created in; the working directory if unset
    pub projects_dir: Option<PathBuf>,
    pub sync_server: SyncServerConfig,
    pub tools: ToolsConfig,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(crate::persistence::DEFAULT_STATE_FILE),
            extension_id: "evaera.vscode-rojo".to_string(),
            projects_dir: None,
            sync_server: SyncServerConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

/// `[sync_server]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncServerConfig {
    /// Shell-style command line; the project path and `--port` are appended
    pub command: String,
    pub host: String,
    pub preferred_port: u16,
    pub fallback_ports: Vec<u16>,
    pub poll_interval_ms: u64,
    pub startup_timeout_secs: u64,
    pub stop_grace_secs: u64,
}

impl Default for SyncServerConfig {
    fn default() -> Self {
        Self {
            command: "rojo serve".to_string(),
            host: "127.0.0.1".to_string(),
            preferred_port: DEFAULT_SERVER_PORT,
            fallback_ports: (DEFAULT_SERVER_PORT + 1..=DEFAULT_SERVER_PORT + 5).collect(),
            poll_interval_ms: 500,
            startup_timeout_secs: 30,
            stop_grace_secs: 5,
        }
    }
}

impl SyncServerConfig {
    /// Split [`command`](Self::command) into program and arguments
    pub fn command_parts(&self) -> Result<(String, Vec<String>), ConfigError> {
        let mut parts = shell_words::split(&self.command).map_err(|e| ConfigError::Validation {
            message: format!("sync_server.command: {}", e),
        })?;
        if parts.is_empty() {
            return Err(ConfigError::Validation {
                message: "sync_server.command is empty".to_string(),
            });
        }
        let program = parts.remove(0);
        Ok((program, parts))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

/// `[tools]` section: program names probed and run by the tool steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    pub editor: String,
    pub toolchain: String,
    pub sync_tool: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            editor: "code".to_string(),
            toolchain: "aftman".to_string(),
            sync_tool: "rojo".to_string(),
        }
    }
}

/// Where configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// No file; built-in defaults
    Defaults,
    File(PathBuf),
}

impl WizardConfig {
    /// Parse TOML content; `origin` names the file in error messages
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: WizardConfig = toml::from_str(content).map_err(|e| ConfigError::Parsing {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a file that must exist
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content, &path.display().to_string())?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve configuration with the documented precedence
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        let cwd = std::env::current_dir()?;
        Self::load_from(explicit, &cwd, user_config_file().as_deref())
    }

    /// [`load`](Self::load) with the working and user config locations given
    #[instrument(skip_all)]
    pub fn load_from(
        explicit: Option<&Path>,
        working_dir: &Path,
        user_file: Option<&Path>,
    ) -> Result<(Self, ConfigSource), ConfigError> {
        let named = explicit.map(Path::to_path_buf).or_else(|| {
            std::env::var_os(CONFIG_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });
        if let Some(path) = named {
            let config = Self::load_from_path(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        let discovered = std::iter::once(working_dir.join(CONFIG_FILE_NAME))
            .chain(user_file.map(Path::to_path_buf))
            .find(|candidate| candidate.is_file());
        match discovered {
            Some(path) => {
                let config = Self::load_from_path(&path)?;
                Ok((config, ConfigSource::File(path)))
            }
            None => {
                debug!("No configuration file found; using defaults");
                Ok((Self::default(), ConfigSource::Defaults))
            }
        }
    }

    /// Reject settings the wizard cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sync_server.command_parts()?;
        let invalid = |message: &str| {
            Err(ConfigError::Validation {
                message: message.to_string(),
            })
        };
        if self.sync_server.preferred_port == 0 || self.sync_server.fallback_ports.contains(&0) {
            return invalid("sync_server ports must be non-zero");
        }
        if self.sync_server.poll_interval_ms == 0 {
            return invalid("sync_server.poll_interval_ms must be positive");
        }
        if self.sync_server.startup_timeout_secs == 0 {
            return invalid("sync_server.startup_timeout_secs must be positive");
        }
        if self.extension_id.trim().is_empty() {
            return invalid("extension_id is empty");
        }
        Ok(())
    }
}

/// `devsetup.toml` in the platform's user configuration directory
pub fn user_config_file() -> Option<PathBuf> {
    directories_next::ProjectDirs::from("", "", "devsetup")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}
