//! Command execution on top of `tollgate-auth`

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tollgate_auth::{
    AuthConfig, Claims, ParsedToken, RequestContext, SecretStore, TokenIssuer, TokenVerifier, parse_unverified,
};
use tracing::debug;

use crate::cli::{Commands, InspectArgs, IssueArgs, OutputFormat, VerifyArgs};
use crate::error::{CliError, CliResult};
use crate::formatter::Formatter;

/// Execute CLI commands
#[derive(Debug)]
pub struct CommandExecutor {
    pub formatter: Formatter,
    verbose: bool,
}

impl CommandExecutor {
    #[must_use]
    pub fn new(format: OutputFormat, colored: bool, verbose: bool) -> Self {
        Self {
            formatter: Formatter::new(format, colored),
            verbose,
        }
    }

    /// Display an error with rich formatting
    pub fn display_error(&self, error: &CliError) {
        self.formatter.display_error(error);
    }

    /// Execute a command
    pub async fn execute(&self, command: Commands, config: Option<&AuthConfig>) -> CliResult<()> {
        match command {
            Commands::Issue(args) => {
                let token = self.issue(config.ok_or(CliError::MissingConfig)?, &args).await?;
                self.formatter.display_token(&token)
            }
            Commands::Verify(args) => {
                let ctx = context(args.request_id.clone(), args.timeout_ms);
                let claims = self
                    .verify(config.ok_or(CliError::MissingConfig)?, &ctx, &args)
                    .await?;
                let request_id = self.verbose.then(|| ctx.request_id());
                self.formatter.display_claims(&claims, request_id)
            }
            Commands::Inspect(args) => {
                let parsed = self.inspect(&args)?;
                self.formatter.display_inspect(&parsed)
            }
        }
    }

    /// Sign the claims described by `args` with the configured primary secret
    pub async fn issue(&self, config: &AuthConfig, args: &IssueArgs) -> CliResult<String> {
        let claims = parse_claims(args)?;
        let store = build_store(config)?;
        let ctx = context(args.request_id.clone(), None);
        debug!(request_id = ctx.request_id(), claims = claims.len(), "Issuing token");
        Ok(TokenIssuer::new(store).create_token(&ctx, claims).await?)
    }

    /// Verify the token named by `args` against the configured secrets
    pub async fn verify(&self, config: &AuthConfig, ctx: &RequestContext, args: &VerifyArgs) -> CliResult<Claims> {
        let token = read_token(&args.token)?;
        let store = build_store(config)?;

        let mut verifier = TokenVerifier::new(store).with_leeway(config.clock_skew_secs);
        if let Some(resolver) = config.key_set_resolver()? {
            verifier = verifier.with_key_set_resolver(Arc::new(resolver));
        }

        Ok(verifier.parse_token(ctx, &token).await?)
    }

    /// Decode the token named by `args` without verifying it
    pub fn inspect(&self, args: &InspectArgs) -> CliResult<ParsedToken> {
        let token = read_token(&args.token)?;
        Ok(parse_unverified(&token)?)
    }
}

fn context(request_id: Option<String>, timeout_ms: Option<u64>) -> RequestContext {
    let ctx = request_id.map_or_else(RequestContext::generate, RequestContext::new);
    match timeout_ms {
        Some(ms) => ctx.with_timeout(Duration::from_millis(ms)),
        None => ctx,
    }
}

fn build_store(config: &AuthConfig) -> CliResult<Arc<SecretStore>> {
    Ok(Arc::new(SecretStore::new(config.secret_set()?)))
}

/// Merge `--claims` and every `--claim KEY=VALUE` into one claim set.
///
/// Later `--claim` values replace earlier ones and anything in `--claims`.
pub fn parse_claims(args: &IssueArgs) -> CliResult<Claims> {
    let mut claims = match serde_json::from_str::<Value>(&args.claims) {
        Ok(Value::Object(map)) => map,
        Ok(_) => {
            return Err(CliError::InvalidArguments(
                "--claims must be a JSON object".to_string(),
            ));
        }
        Err(e) => {
            return Err(CliError::InvalidArguments(format!("Invalid JSON claims: {e}")));
        }
    };

    for pair in &args.extra {
        let (key, raw) = pair
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| CliError::InvalidArguments(format!("expected KEY=VALUE, got '{pair}'")))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        claims.insert(key.to_string(), value);
    }

    Ok(claims)
}

/// Token from the argument, or from stdin when the argument is `-`
fn read_token(arg: &str) -> CliResult<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf.trim().to_string())
    } else {
        Ok(arg.trim().to_string())
    }
}
