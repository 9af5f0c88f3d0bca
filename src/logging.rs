//! Structured logging setup.
//!
//! The engine itself only emits `tracing` events; installing a subscriber is
//! the host application's choice. This module provides an opt-in initializer
//! for hosts that do not already carry one.

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Most detailed debugging output.
    Trace,
    /// Detailed debugging output.
    Debug,
    /// Business-level events.
    Info,
    /// Potential issues.
    Warn,
    /// Errors only.
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Single-line compact output.
    Compact,
    /// JSON output for production environments.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level to emit.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Whether to include thread ids.
    pub show_thread_ids: bool,
    /// Whether to include the emitting module path.
    pub show_target: bool,
    /// Whether to emit span enter/close events.
    pub show_span_events: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            show_thread_ids: false,
            show_target: true,
            show_span_events: false,
        }
    }
}

impl LogConfig {
    /// Configuration suited to development: debug level, span events on.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            show_span_events: true,
            ..Self::default()
        }
    }

    /// Configuration suited to production: JSON output with thread ids.
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            show_thread_ids: true,
            ..Self::default()
        }
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("marketsync={}", config.level)))
}

fn span_events(config: &LogConfig) -> FmtSpan {
    if config.show_span_events {
        FmtSpan::ENTER | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Installs the global tracing subscriber.
///
/// Panics if a subscriber is already installed; use [`try_init_logging`] when
/// that is a possibility.
pub fn init_logging(config: &LogConfig) {
    build(config, false);
}

/// Installs the global tracing subscriber, ignoring duplicate installation.
pub fn try_init_logging(config: &LogConfig) {
    build(config, true);
}

fn build(config: &LogConfig, lenient: bool) {
    let filter = env_filter(config);
    let events = span_events(config);
    match config.format {
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .pretty()
                .with_thread_ids(config.show_thread_ids)
                .with_target(config.show_target)
                .with_span_events(events)
                .with_filter(filter);
            install(tracing_subscriber::registry().with(layer), lenient);
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_thread_ids(config.show_thread_ids)
                .with_target(config.show_target)
                .with_span_events(events)
                .with_filter(filter);
            install(tracing_subscriber::registry().with(layer), lenient);
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_thread_ids(config.show_thread_ids)
                .with_target(config.show_target)
                .with_span_events(events)
                .with_filter(filter);
            install(tracing_subscriber::registry().with(layer), lenient);
        }
    }
}

fn install<S>(subscriber: S, lenient: bool)
where
    S: SubscriberInitExt,
{
    if lenient {
        let _ = subscriber.try_init();
    } else {
        subscriber.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_config_presets() {
        let dev = LogConfig::development();
        assert_eq!(dev.level, LogLevel::Debug);
        assert!(dev.show_span_events);

        let prod = LogConfig::production();
        assert_eq!(prod.format, LogFormat::Json);
        assert!(prod.show_thread_ids);
    }

    #[test]
    fn test_try_init_twice() {
        let config = LogConfig::default();
        try_init_logging(&config);
        try_init_logging(&config);
    }
}
