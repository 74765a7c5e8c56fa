//! # Tollgate CLI
//!
//! Command-line front end for `tollgate-auth`, running the gateway's own
//! verification and issuance logic against a configuration file.
//!
//! ## Usage
//!
//! ```bash
//! # Issue a token with the primary secret
//! tollgate --config gateway.toml issue --claims '{"sub":"alice"}' --claim role=admin
//!
//! # Verify it (reads the token from stdin with `-`)
//! tollgate --config gateway.toml issue | tollgate --config gateway.toml verify -
//!
//! # Decode a token without checking its signature
//! tollgate inspect eyJhbGciOi... --format json
//! ```

pub mod cli;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod logging;

use clap::Parser;
use tollgate_auth::{AuthConfig, LoggingConfig};

use crate::cli::Cli;
use crate::error::CliResult;
use crate::executor::CommandExecutor;

pub use cli::{Commands, OutputFormat};
pub use error::CliError;

/// Run the CLI application
pub async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let config = cli.config.as_ref().map(AuthConfig::from_file).transpose()?;
    let logging = config.as_ref().map_or_else(LoggingConfig::default, |c| c.logging.clone());
    logging::init(&logging, cli.verbose)?;

    let executor = CommandExecutor::new(cli.format, !cli.no_color, cli.verbose);

    if let Err(e) = executor.execute(cli.command, config.as_ref()).await {
        executor.display_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
