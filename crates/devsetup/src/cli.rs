use crate::commands::{self, setup::SetupArgs, verify::VerifyArgs};
use anyhow::{Context as _, Result};
use clap::{Arg, ArgAction, CommandFactory, FromArgMatches, Parser, ValueEnum};
use devsetup_core::config::WizardConfig;
use std::path::PathBuf;
use std::process::ExitCode;

/// Log format options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Interactive setup wizard for a Roblox development environment
#[derive(Debug, Parser)]
#[command(name = "devsetup", version, long_about = None)]
pub struct Cli {
    /// Discard saved progress and start from the first step
    #[arg(short = 'r', long)]
    pub reset: bool,

    /// Verify every step's setup and print a report instead of running the wizard
    #[arg(long, conflicts_with = "reset")]
    pub verify: bool,

    /// Configuration file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Progress record path (overrides `state_file` from the configuration)
    #[arg(long, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Log format (text or json, defaults to text, can be set via DEVSETUP_LOG_FORMAT env var)
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, value_enum, default_value = "warn")]
    pub log_level: LogLevel,

    /// Append progress events as JSON lines to this file
    #[arg(long, value_name = "PATH")]
    pub progress_file: Option<PathBuf>,
}

impl Cli {
    /// Command definition with `-v` as the version short flag
    pub fn command_with_version_flag() -> clap::Command {
        <Self as CommandFactory>::command()
            .disable_version_flag(true)
            .arg(
                Arg::new("version")
                    .short('v')
                    .long("version")
                    .action(ArgAction::Version)
                    .help("Print version"),
            )
    }

    /// Parse the process arguments
    pub fn try_parse_env() -> Result<Self, clap::Error> {
        let matches = Self::command_with_version_flag().try_get_matches()?;
        Self::from_arg_matches(&matches)
    }

    /// Initialize logging, load configuration and run the selected mode
    pub async fn dispatch(self) -> Result<ExitCode> {
        let log_format = self.log_format.map(|format| match format {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        });

        // Respect explicit filter variables; otherwise apply the flag's level
        if std::env::var_os("DEVSETUP_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            let level = self.log_level.as_str();
            std::env::set_var(
                "DEVSETUP_LOG",
                format!("devsetup={},devsetup_core={}", level, level),
            );
        }
        devsetup_core::logging::init(log_format)?;
        tracing::debug!("CLI initialized with log level: {}", self.log_level.as_str());

        let (mut config, source) = WizardConfig::load(self.config.as_deref())
            .context("Failed to load configuration")?;
        tracing::debug!(?source, "Configuration loaded");
        if let Some(state_file) = self.state_file {
            config.state_file = state_file;
        }

        if self.verify {
            commands::verify::execute(VerifyArgs { config }).await
        } else {
            commands::setup::execute(SetupArgs {
                config,
                reset: self.reset,
                progress_file: self.progress_file,
            })
            .await
        }
    }
}
