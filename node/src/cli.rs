//! # CLI Interface
//!
//! Defines the command-line argument structure for `bursar-node` using
//! `clap` derive. Supports five subcommands: `init`, `replay`, `serve`,
//! `address`, and `version`.

use bursar_protocol::AccountId;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Bursar institution accounting node.
///
/// Creates genesis configurations, replays call scripts against a fresh
/// chain, and serves the ledger and institution over HTTP with Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(
    name = "bursar-node",
    about = "Bursar institution accounting node",
    version,
    propagate_version = true
)]
pub struct BursarNodeCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, env = "BURSAR_LOG_FORMAT", default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Bursar node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a reference genesis configuration.
    Init(InitArgs),
    /// Execute a JSON call script against a fresh chain.
    Replay(ReplayArgs),
    /// Serve the HTTP API and the metrics endpoint.
    Serve(ServeArgs),
    /// Print the account id derived from a label.
    Address(AddressArgs),
    /// Print version information and exit.
    Version,
}

/// `--log-format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable output.
    Pretty,
    /// JSON lines.
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the genesis JSON.
    #[arg(long, short = 'o', default_value = "genesis.json")]
    pub out: PathBuf,

    /// Admin account: `0x`-prefixed hex, or a label to derive one from.
    #[arg(long, value_parser = parse_account)]
    pub admin: AccountId,

    /// Institution account: `0x`-prefixed hex, or a label.
    #[arg(long, value_parser = parse_account)]
    pub institution: AccountId,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `replay` subcommand.
#[derive(Parser, Debug)]
pub struct ReplayArgs {
    /// Genesis configuration to start from.
    #[arg(long, short = 'g', env = "BURSAR_GENESIS")]
    pub genesis: PathBuf,

    /// JSON array of `{ caller, value, call }` entries.
    #[arg(long, short = 's')]
    pub script: PathBuf,

    /// Print the final world state after the last entry.
    #[arg(long)]
    pub dump_state: bool,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Genesis configuration to start from.
    #[arg(long, short = 'g', env = "BURSAR_GENESIS")]
    pub genesis: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "BURSAR_PORT", default_value_t = 9841)]
    pub port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "BURSAR_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,
}

/// Arguments for the `address` subcommand.
#[derive(Parser, Debug)]
pub struct AddressArgs {
    /// Human-readable label, e.g. `alice`.
    pub label: String,
}

/// Accepts a hex account id, or derives one from any other string.
pub fn parse_account(s: &str) -> Result<AccountId, String> {
    if s.starts_with("0x") {
        s.parse::<AccountId>().map_err(|e| e.to_string())
    } else if s.is_empty() {
        Err("account must not be empty".into())
    } else {
        Ok(AccountId::from_label(s))
    }
}
