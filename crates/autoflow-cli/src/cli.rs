//! CLI argument definitions for autoflow.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// autoflow -- natural-language browser workflows.
#[derive(Parser)]
#[command(
    name = "autoflow",
    version,
    about = "autoflow -- generate and run browser automation workflows",
    long_about = "Turns natural-language requests into structured workflows using \
                  interchangeable text-generation providers, and executes them."
)]
pub struct Cli {
    /// Configuration file.  Falls back to `AUTOFLOW_CONFIG`, then
    /// `autoflow.toml` in the working directory.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Default log level when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a workflow from a description and print it as JSON.
    Generate {
        /// What the workflow should do.
        description: String,

        /// Provider to try first.
        #[arg(long, short)]
        provider: Option<String>,

        /// URL of the page the workflow targets.
        #[arg(long)]
        url: Option<String>,

        /// Write the workflow to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Execute a workflow file with the dry-run step runner.
    Run {
        /// Workflow JSON file.
        workflow: PathBuf,

        /// Execution parameter as `key=value`; the value is parsed as JSON
        /// when possible.  Repeatable.
        #[arg(long = "param", short = 'p', value_parser = parse_param)]
        params: Vec<(String, serde_json::Value)>,
    },

    /// Answer JSON-lines requests from stdin on stdout.
    Serve,

    /// Print provider metrics, rate limiter state and cache statistics.
    Stats,

    /// List configured providers and whether a credential is present.
    Providers,
}

/// Parse `key=value` into a parameter pair.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in `{raw}`"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn param_values_are_json_when_possible() {
        assert_eq!(parse_param("n=3").unwrap(), ("n".into(), json!(3)));
        assert_eq!(parse_param("flag=true").unwrap(), ("flag".into(), json!(true)));
        assert_eq!(
            parse_param("query=red shoes").unwrap(),
            ("query".into(), json!("red shoes"))
        );
        assert_eq!(parse_param("eq=a=b").unwrap(), ("eq".into(), json!("a=b")));
    }

    #[test]
    fn malformed_params_are_rejected() {
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn cli_parses_run_with_params() {
        let cli = Cli::try_parse_from([
            "autoflow", "run", "wf.json", "-p", "city=Paris", "--param", "max=5",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { workflow, params } => {
                assert_eq!(workflow, PathBuf::from("wf.json"));
                assert_eq!(params.len(), 2);
                assert_eq!(params[1], ("max".into(), json!(5)));
            }
            _ => panic!("expected run"),
        }
    }
}
