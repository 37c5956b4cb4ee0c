//! Process-wide tracing setup.
//!
//! Call [`init_logging`] once, before the library is opened, so scan and
//! discovery output is captured from the start.

use clap::ValueEnum;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Overrides the mode's default level. Takes precedence over `RUST_LOG`.
pub const LOG_LEVEL_VAR: &str = "MUSICBOX_LOG_LEVEL";

/// Output format and default verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LoggingMode {
    /// Multi-line human output with source locations, `debug` level.
    Development,
    /// Compact single-line output, `info` level.
    Production,
    /// One JSON object per line, `info` level.
    Json,
}

impl LoggingMode {
    pub fn default_level(self) -> &'static str {
        match self {
            LoggingMode::Development => "debug",
            LoggingMode::Production | LoggingMode::Json => "info",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Invalid environment variable: {0}")]
    InvalidEnv(String),
}

/// Install the global subscriber for `mode`.
///
/// A second call is a no-op, whichever mode the first one used.
///
/// # Environment Variables
///
/// - `MUSICBOX_LOG_LEVEL`: filter directives, e.g. `warn,music_index=debug`
/// - `RUST_LOG`: used when `MUSICBOX_LOG_LEVEL` is unset
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    if is_initialized() {
        return Ok(());
    }
    let filter = create_env_filter(mode.default_level())?;

    let result = match mode {
        LoggingMode::Development => Registry::default()
            .with(
                fmt::layer()
                    .pretty()
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .try_init(),
        LoggingMode::Production => Registry::default()
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .compact(),
            )
            .with(filter)
            .try_init(),
        LoggingMode::Json => Registry::default()
            .with(fmt::layer().json().with_current_span(false))
            .with(filter)
            .try_init(),
    };

    result.map_err(|e| LoggingError::TracingInit(e.to_string()))
}

/// `MUSICBOX_LOG_LEVEL`, then `RUST_LOG`, then `default_level`.
fn create_env_filter(default_level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(level) = std::env::var(LOG_LEVEL_VAR) {
        parse_directives(LOG_LEVEL_VAR, &level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        parse_directives("RUST_LOG", &rust_log)
    } else {
        parse_directives("default", default_level)
    }
}

fn parse_directives(source: &str, directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives).map_err(|e| LoggingError::InvalidEnv(format!("{source}={directives}: {e}")))
}

pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
