//! Process-wide tracing subscriber setup shared by both binaries

use crate::{Result, XproberError};
use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

/// Output encoding for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Logfmt,
    Json,
}

impl FromStr for LogFormat {
    type Err = XproberError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "logfmt" => Ok(LogFormat::Logfmt),
            "json" => Ok(LogFormat::Json),
            other => Err(XproberError::LoggingError(format!(
                "unknown log format {other:?} (expected logfmt or json)"
            ))),
        }
    }
}

/// Install the global subscriber. `level` accepts any `EnvFilter` directive.
pub fn init(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .map_err(|e| XproberError::LoggingError(format!("invalid log level {level:?}: {e}")))?;

    let installed = match format {
        LogFormat::Logfmt => fmt().with_env_filter(filter).with_target(true).try_init(),
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init(),
    };

    installed.map_err(|e| XproberError::LoggingError(e.to_string()))
}
