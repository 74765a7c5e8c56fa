//! CLI argument parsing

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Main CLI application structure
#[derive(Parser, Debug)]
#[command(
    name = "tollgate",
    version,
    about = "Issue, verify and inspect gateway bearer tokens",
    long_about = "Tollgate loads the gateway's secret configuration and runs the same\n\
                  verification and issuance logic the gateway uses.\n\n\
                  SECURITY WARNINGS:\n\
                  - Tokens printed by `issue` are live credentials\n\
                  - `inspect` does NOT check signatures; never trust its output"
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c', global = true, env = "TOLLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign a claim set with the primary secret
    Issue(IssueArgs),

    /// Verify a token against the configured secrets
    Verify(VerifyArgs),

    /// Decode a token without verifying it
    Inspect(InspectArgs),
}

/// Arguments for `issue`
#[derive(Args, Debug, Clone, Default)]
pub struct IssueArgs {
    /// Claims as a JSON object
    #[arg(long, default_value = "{}")]
    pub claims: String,

    /// Extra claim as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(long = "claim", value_name = "KEY=VALUE")]
    pub extra: Vec<String>,

    /// Request-correlation id for logs
    #[arg(long)]
    pub request_id: Option<String>,
}

/// Arguments for `verify`
#[derive(Args, Debug, Clone)]
pub struct VerifyArgs {
    /// Token to verify, or `-` to read it from stdin
    pub token: String,

    /// Request-correlation id for logs
    #[arg(long)]
    pub request_id: Option<String>,

    /// Give up on key-set resolution after this many milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// Arguments for `inspect`
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Token to decode, or `-` to read it from stdin
    pub token: String,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable with colors
    Human,
    /// Pretty JSON
    Json,
    /// Compact JSON (no pretty print)
    Compact,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_issue() {
        let cli = Cli::try_parse_from([
            "tollgate",
            "--config",
            "gateway.toml",
            "issue",
            "--claims",
            r#"{"sub":"alice"}"#,
            "--claim",
            "role=admin",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("gateway.toml")));
        assert_eq!(cli.format, OutputFormat::Human);
        let Commands::Issue(args) = cli.command else {
            panic!("expected issue");
        };
        assert_eq!(args.claims, r#"{"sub":"alice"}"#);
        assert_eq!(args.extra, vec!["role=admin"]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tollgate", "verify", "a.b.c", "-f", "json", "-v", "--timeout-ms", "250"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.verbose);
        let Commands::Verify(args) = cli.command else {
            panic!("expected verify");
        };
        assert_eq!(args.token, "a.b.c");
        assert_eq!(args.timeout_ms, Some(250));
    }

    #[test]
    fn test_inspect_requires_token() {
        assert!(Cli::try_parse_from(["tollgate", "inspect"]).is_err());
    }
}
