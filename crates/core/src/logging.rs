//! Logging and observability
//!
//! Structured logging via `tracing` with either human-readable text or JSON
//! formatting, chosen at runtime from the CLI flag or environment.
//!
//! All logging output is directed to stderr, next to the prompts; stdout
//! carries only the final reports.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable selecting the log format ("json" or "text")
pub const LOG_FORMAT_ENV: &str = "DEVSETUP_LOG_FORMAT";

/// Environment variable holding the log filter directive
pub const LOG_FILTER_ENV: &str = "DEVSETUP_LOG";

/// Initialize the logging system with an optional format
///
/// Safe to call multiple times; only the first call installs a subscriber.
///
/// ## Environment Variables
///
/// * `DEVSETUP_LOG_FORMAT` - "json" for JSON lines, anything else for text
/// * `DEVSETUP_LOG` - filter directive (e.g. `devsetup_core=debug`)
/// * `RUST_LOG` - fallback filter directive
///
/// ## Example
///
/// ```rust
/// use devsetup_core::logging;
///
/// logging::init(None).expect("Failed to initialize logging");
/// logging::init(Some("json")).expect("second call is a no-op");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let filter = create_env_filter();

        let env_format = std::env::var(LOG_FORMAT_ENV).ok();
        let effective_format = resolve_format(format, env_format.as_deref());

        match effective_format {
            LogOutput::Json => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_target(true)
                            .with_span_events(fmt::format::FmtSpan::CLOSE)
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
            LogOutput::Text => {
                tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .with_target(false)
                            .without_time()
                            .with_writer(io::stderr),
                    )
                    .with(filter)
                    .init();
            }
        }

        tracing::debug!("Logging initialized with format: {:?}", effective_format);
    });

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogOutput {
    Text,
    Json,
}

/// The flag wins over the environment; anything but "json" is text
fn resolve_format(flag: Option<&str>, env: Option<&str>) -> LogOutput {
    match flag.or(env) {
        Some(value) if value.eq_ignore_ascii_case("json") => LogOutput::Json,
        _ => LogOutput::Text,
    }
}

/// Create an EnvFilter based on environment variables
fn create_env_filter() -> EnvFilter {
    if let Ok(directive) = std::env::var(LOG_FILTER_ENV) {
        EnvFilter::try_new(&directive).unwrap_or_else(|_| {
            eprintln!(
                "Invalid {} filter '{}', using default 'warn'",
                LOG_FILTER_ENV, directive
            );
            EnvFilter::new("warn")
        })
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}
