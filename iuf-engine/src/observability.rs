//! Logging initialization.
//!
//! The engine only emits `tracing` events; installing a subscriber is left
//! to the embedding binary. [`init_logging`] is a convenience for binaries
//! and tests that want the standard setup:
//!
//! ```no_run
//! use iuf_engine::observability::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::from_env());
//! tracing::info!(activity = "a1", "Engine started");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable selecting the log level.
pub const LOG_LEVEL_ENV: &str = "IUF_LOG_LEVEL";
/// Environment variable selecting the output format (`json` or `pretty`).
pub const LOG_FORMAT_ENV: &str = "IUF_LOG_FORMAT";

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for this crate's events.
    pub level: Level,
    /// Emit JSON lines instead of human-readable output.
    pub use_json: bool,
    /// Include the event target.
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
        }
    }
}

impl LoggingConfig {
    /// Creates a configuration with the given level.
    #[must_use]
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// JSON output at INFO.
    #[must_use]
    pub fn production() -> Self {
        Self {
            use_json: true,
            ..Self::default()
        }
    }

    /// Reads `IUF_LOG_LEVEL` and `IUF_LOG_FORMAT`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var(LOG_LEVEL_ENV)
            .map(|v| parse_level(&v))
            .unwrap_or(Level::INFO);
        let use_json = env::var(LOG_FORMAT_ENV)
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        Self {
            level,
            use_json,
            ..Self::default()
        }
    }
}

/// Parses a level name, defaulting to INFO.
#[must_use]
pub fn parse_level(value: &str) -> Level {
    match value.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber. Later calls are ignored, as is a
/// subscriber that was already installed by someone else.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = format!("iuf_engine={}", config.level).parse() {
            filter = filter.add_directive(directive);
        }

        let result = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_target(config.include_target))
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(config.include_target))
                .try_init()
        };

        if let Err(err) = result {
            tracing::debug!(error = %err, "Subscriber already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("bogus"), Level::INFO);
    }

    #[test]
    fn test_production_is_json() {
        let config = LoggingConfig::production();
        assert!(config.use_json);
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(&LoggingConfig::with_level(Level::DEBUG));
        init_logging(&LoggingConfig::default());
    }
}
