use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{AgentError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set, e.g. `info` or `turnstile=debug`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".into()
}

impl LoggingConfig {
    pub fn filter(&self) -> Result<EnvFilter> {
        if std::env::var("RUST_LOG").is_ok() {
            return Ok(EnvFilter::from_default_env());
        }
        EnvFilter::try_new(&self.level)
            .map_err(|err| AgentError::Config(format!("invalid log filter `{}`: {err}", self.level)))
    }
}

/// Installs the global `tracing` subscriber. Fails when one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.filter()?)
        .with_target(true)
        .with_level(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|err| AgentError::Config(format!("failed to install tracing subscriber: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_directives() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            level: "turnstile=loudest".into(),
            json: false,
        };
        assert!(config.filter().is_err());
        assert!(LoggingConfig::default().filter().is_ok());
    }
}
