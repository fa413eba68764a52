//! Process-wide logging bootstrap.
//!
//! The library itself only emits `tracing` events; installing a
//! subscriber is the host application's job, done once at startup. This
//! module provides the conventional bootstrap driven by the
//! `NILLION_LOG_LEVEL` environment variable.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Environment variable selecting the log level.
pub const LOG_LEVEL_VAR: &str = "NILLION_LOG_LEVEL";

/// The log levels accepted in [`LOG_LEVEL_VAR`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Suppress all output.
    Silent,
}

impl LogLevel {
    /// Reads the level from the environment, defaulting to `info` when
    /// the variable is unset or unrecognized.
    pub fn from_env() -> Self {
        env::var(LOG_LEVEL_VAR)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "silent" => Ok(LogLevel::Silent),
            _ => Err(()),
        }
    }
}

/// Installs the global `tracing` subscriber at the level selected by
/// `NILLION_LOG_LEVEL`.
///
/// Call once, before the first library call. A second call is a no-op so
/// that embedding applications with their own subscriber keep it.
pub fn init_logging() {
    init_logging_at(LogLevel::from_env());
}

/// Installs the global `tracing` subscriber at an explicit level.
pub fn init_logging_at(level: LogLevel) {
    let filter = EnvFilter::new(level.as_directive());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
