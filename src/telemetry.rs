//! Logging setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured `log_level` directive
//! is used. Development gets human-readable output, every other environment
//! gets one JSON object per line.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{Environment, ServerConfig};

pub type TelemetryError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install the global tracing subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &ServerConfig) -> Result<(), TelemetryError> {
    let env_filter = env_filter(config);

    match config.environment {
        Environment::Development => fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init(),
        Environment::Staging | Environment::Production => fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(false)
            .try_init(),
    }
}

fn env_filter(config: &ServerConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn falls_back_to_configured_directive() {
        let config = ServerConfig {
            log_level: "warn,post_hub=trace".to_string(),
            ..Default::default()
        };
        if std::env::var("RUST_LOG").is_err() {
            assert_eq!(env_filter(&config).max_level_hint(), Some(LevelFilter::TRACE));
        }
    }
}
