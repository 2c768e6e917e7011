//! # CLI Interface
//!
//! Command-line argument structure for `marquee-gateway`, via `clap`
//! derive. Three subcommands: `run`, `check-config`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Marquee ledger gateway.
///
/// Stages transfers against the external ledger service and commits them
/// when the client presents its staging tokens. Serves the HTTP API and
/// exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "marquee-gateway",
    about = "Marquee ledger staging/commit gateway",
    version,
    propagate_version = true
)]
pub struct MarqueeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the gateway.
    Run(RunArgs),
    /// Load and validate a configuration file, then exit.
    CheckConfig(CheckConfigArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the gateway configuration file (TOML).
    #[arg(long, short = 'c', env = "MARQUEE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Run against the built-in in-memory ledger with seeded demo
    /// balances instead of the configured external ledger.
    ///
    /// No configuration file is required in this mode.
    #[arg(long)]
    pub devnet: bool,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "MARQUEE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `check-config` subcommand.
#[derive(Parser, Debug)]
pub struct CheckConfigArgs {
    /// Path to the configuration file to validate.
    #[arg(long, short = 'c', env = "MARQUEE_CONFIG")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        MarqueeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = MarqueeCli::parse_from(["marquee-gateway", "run", "--devnet"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert!(args.devnet);
        assert!(args.config.is_none());
        assert_eq!(args.log_format, "pretty");
    }
}
