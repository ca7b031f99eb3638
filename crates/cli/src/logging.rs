//! Tracing subscriber setup. Events go to stderr so command output on
//! stdout stays machine-readable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

pub const LOG_ENV: &str = "CARTILLA_LOG";

/// Install the global subscriber. `CARTILLA_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<(), String> {
    let filter = match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| format!("invalid log level '{}': {}", config.level, e))?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .map_err(|e| format!("could not install log subscriber: {e}"))
}
