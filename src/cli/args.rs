use crate::config::LedgerConfig;
use crate::core::SignConvention;
use crate::telemetry::LogFormat;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Replay a journal of transfers against a set of accounts
#[derive(Parser, Debug)]
#[command(name = "ledger-engine")]
#[command(about = "Replay a CSV journal through the double-entry ledger", long_about = None)]
pub struct CliArgs {
    /// CSV file declaring the accounts to open
    #[arg(value_name = "ACCOUNTS", help = "Path to the accounts CSV file")]
    pub accounts_file: PathBuf,

    /// CSV file with the journal to replay, in order
    #[arg(value_name = "JOURNAL", help = "Path to the journal CSV file")]
    pub journal_file: PathBuf,

    /// How DEBIT and CREDIT move balances
    #[arg(
        long = "convention",
        value_name = "CONVENTION",
        default_value = "custodial",
        help = "Sign convention: 'custodial' (credit increases every account) or 'standard' (textbook double entry)"
    )]
    pub convention: ConventionType,

    /// Guard acquisition timeout in milliseconds
    #[arg(
        long = "guard-timeout-ms",
        value_name = "MILLIS",
        help = "How long a posting may wait for its account guards (default: 5000)"
    )]
    pub guard_timeout_ms: Option<u64>,

    /// Log output format
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        default_value = "pretty",
        help = "Log format on stderr: 'pretty' or 'json'"
    )]
    pub log_format: LogFormatType,
}

/// Available sign conventions
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConventionType {
    Custodial,
    Standard,
}

impl From<ConventionType> for SignConvention {
    fn from(value: ConventionType) -> Self {
        match value {
            ConventionType::Custodial => SignConvention::Custodial,
            ConventionType::Standard => SignConvention::Standard,
        }
    }
}

/// Available log formats
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatType {
    Pretty,
    Json,
}

impl From<LogFormatType> for LogFormat {
    fn from(value: LogFormatType) -> Self {
        match value {
            LogFormatType::Pretty => LogFormat::Pretty,
            LogFormatType::Json => LogFormat::Json,
        }
    }
}

impl CliArgs {
    /// Create a LedgerConfig from CLI arguments
    ///
    /// Missing values fall back to the defaults; a zero timeout is replaced by
    /// the default with a warning.
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();
        let timeout = self
            .guard_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(default.guard_timeout);
        LedgerConfig::new(timeout, self.convention.into())
    }
}
