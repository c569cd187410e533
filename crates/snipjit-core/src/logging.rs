//! Logging setup for hosts embedding the pipeline
//!
//! The library only emits `tracing` events (targets `snipjit::driver`,
//! `snipjit::jit` and `snipjit::pipeline`); installing a subscriber is up to
//! the host. These helpers install a registry with an `EnvFilter` and a fmt
//! layer. `RUST_LOG` directives are honoured on top of the configured level.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Minimum level of events to print
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    #[must_use]
    pub const fn as_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Include the event target (`snipjit::jit`, ...)
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            with_target: true,
            with_thread_ids: false,
            ansi: true,
        }
    }
}

/// Install a global subscriber for `config`
///
/// Does nothing if the level is `off` or a subscriber is already installed.
pub fn init(config: &LoggingConfig) {
    let Some(level) = config.level.as_level() else {
        return;
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(config.with_target)
                .with_thread_ids(config.with_thread_ids)
                .with_ansi(config.ansi),
        )
        .try_init();
}

/// Initialize logging with default settings (for tests and quick starts)
pub fn init_default() {
    let filter = EnvFilter::from_default_env().add_directive(Level::INFO.into());

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_map_to_tracing() {
        assert_eq!(LogLevel::Off.as_level(), None);
        assert_eq!(LogLevel::Debug.as_level(), Some(Level::DEBUG));
        assert_eq!(LoggingConfig::default().level, LogLevel::Warn);
    }

    #[test]
    fn init_is_repeatable() {
        init_default();
        init(&LoggingConfig::default());
    }
}
