//! Logging initialization
//!
//! Logs always go to stderr so stdout carries only command output (tokens,
//! claims) and stays pipeable.

use std::io;

use tollgate_auth::LoggingConfig;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{CliError, CliResult};

/// Filter directive used when `RUST_LOG` is unset
pub fn default_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.level.clone()
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns [`CliError::Logging`] if a subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config, verbose)));
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber
            .with(fmt::layer().json().with_writer(io::stderr))
            .try_init()
            .map_err(|e| CliError::Logging(e.to_string()))
    } else {
        subscriber
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()
            .map_err(|e| CliError::Logging(e.to_string()))
    }
}
