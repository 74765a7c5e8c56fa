//! Output formatting for CLI

use chrono::DateTime;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::{Value, json};
use tollgate_auth::{Claims, ParsedToken};

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};

/// Claims rendered with a human-readable timestamp next to the number
const TIME_CLAIMS: [&str; 3] = ["exp", "iat", "nbf"];

/// Format and display output based on format preference
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    #[must_use]
    pub fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    /// Print an issued token
    pub fn display_token(&self, token: &str) -> CliResult<()> {
        match self.format {
            OutputFormat::Human => {
                println!("{token}");
                Ok(())
            }
            _ => self.display_json(&json!({ "token": token })),
        }
    }

    /// Print claims of a verified token
    pub fn display_claims(&self, claims: &Claims, request_id: Option<&str>) -> CliResult<()> {
        match self.format {
            OutputFormat::Human => {
                self.print_header("Token verified");
                if let Some(request_id) = request_id {
                    println!("  request id: {request_id}");
                }
                self.print_claims(claims);
                Ok(())
            }
            _ => self.display_json(&json!({ "verified": true, "claims": claims })),
        }
    }

    /// Print a decoded but unverified token
    pub fn display_inspect(&self, parsed: &ParsedToken) -> CliResult<()> {
        match self.format {
            OutputFormat::Human => {
                self.print_header("Header (unverified)");
                println!("  alg: {}", parsed.header.alg);
                if let Some(kid) = &parsed.header.kid {
                    println!("  kid: {kid}");
                }
                if let Some(typ) = &parsed.header.typ {
                    println!("  typ: {typ}");
                }
                self.print_header("Claims (unverified)");
                self.print_claims(&parsed.claims);
                Ok(())
            }
            _ => self.display_json(&json!({
                "verified": false,
                "header": {
                    "alg": parsed.header.alg,
                    "kid": parsed.header.kid,
                    "typ": parsed.header.typ,
                },
                "claims": parsed.claims,
            })),
        }
    }

    /// Print an error to stderr
    pub fn display_error(&self, error: &CliError) {
        match self.format {
            OutputFormat::Human if self.colored => eprintln!("{} {error}", "Error:".red().bold()),
            OutputFormat::Human => eprintln!("Error: {error}"),
            _ => eprintln!("{}", json!({ "error": error.to_string() })),
        }
    }

    fn display_json<T: Serialize + ?Sized>(&self, value: &T) -> CliResult<()> {
        let out = if self.format == OutputFormat::Compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        println!("{out}");
        Ok(())
    }

    fn print_header(&self, text: &str) {
        if self.colored {
            println!("{}", text.green().bold());
        } else {
            println!("{text}");
        }
    }

    fn print_claims(&self, claims: &Claims) {
        let mut keys: Vec<&String> = claims.keys().collect();
        keys.sort();
        for key in keys {
            let value = &claims[key.as_str()];
            let label = if self.colored {
                key.cyan().to_string()
            } else {
                key.clone()
            };
            println!("  {label}: {}", render_claim(key, value));
        }
    }
}

/// Render one claim value, annotating Unix timestamps
pub fn render_claim(key: &str, value: &Value) -> String {
    let rendered = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if TIME_CLAIMS.contains(&key)
        && let Some(time) = value.as_i64().and_then(|secs| DateTime::from_timestamp(secs, 0))
    {
        return format!("{rendered} ({})", time.to_rfc3339());
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_timestamp_claims() {
        assert_eq!(
            render_claim("exp", &json!(0)),
            "0 (1970-01-01T00:00:00+00:00)"
        );
        assert_eq!(render_claim("count", &json!(0)), "0");
        assert_eq!(render_claim("sub", &json!("alice")), "alice");
        assert_eq!(render_claim("roles", &json!(["a", "b"])), r#"["a","b"]"#);
    }
}
