//! # CLI Interface
//!
//! Command-line structure for `tidepool-node` (clap derive). Every flag has
//! a `TIDEPOOL_*` environment fallback.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tidepool vault operator node.
///
/// Runs a pooled-fund vault over an in-memory asset ledger with reference
/// strategies, serves the HTTP/WebSocket API, and exposes Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(
    name = "tidepool-node",
    about = "Tidepool vault operator node",
    version,
    propagate_version = true
)]
pub struct TidepoolCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Write a default devnet configuration file.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for `run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Node configuration file (JSON). When absent the devnet defaults are
    /// used.
    #[arg(long, short = 'c', env = "TIDEPOOL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind both listeners on.
    #[arg(long, env = "TIDEPOOL_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "TIDEPOOL_API_PORT", default_value_t = 8640)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "TIDEPOOL_METRICS_PORT", default_value_t = 8641)]
    pub metrics_port: u16,

    /// Log format: `pretty` or `json`.
    #[arg(long, env = "TIDEPOOL_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for `init`.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the configuration.
    #[arg(long, short = 'o', env = "TIDEPOOL_CONFIG", default_value = "tidepool.json")]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,

    /// Buffer target to write instead of the devnet default.
    #[arg(long)]
    pub buffer_target: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        TidepoolCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = TidepoolCli::try_parse_from(["tidepool-node", "run"]).unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.api_port, 8640);
        assert_eq!(args.metrics_port, 8641);
        assert_eq!(args.log_format, "pretty");
    }

    #[test]
    fn init_flags() {
        let cli = TidepoolCli::try_parse_from([
            "tidepool-node",
            "init",
            "-o",
            "/tmp/vault.json",
            "--force",
            "--buffer-target",
            "500",
        ])
        .unwrap();
        let Commands::Init(args) = cli.command else {
            panic!("expected init");
        };
        assert_eq!(args.output, PathBuf::from("/tmp/vault.json"));
        assert!(args.force);
        assert_eq!(args.buffer_target, Some(500));
    }
}
