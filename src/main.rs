//! Ledger Engine CLI
//!
//! Replays a CSV journal through the double-entry ledger.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- accounts.csv journal.csv > balances.csv
//! cargo run -- --convention standard accounts.csv journal.csv > balances.csv
//! RUST_LOG=debug cargo run -- --log-format json accounts.csv journal.csv > balances.csv
//! ```
//!
//! Accounts are opened from the first file, journal rows are applied in
//! order, the ledger is verified and the final balances go to stdout.
//! Rejected rows are logged to stderr and skipped.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (file not found, storage failure, failed verification, etc.)

use ledger_engine::{cli, telemetry, JournalReplay};
use std::process;

#[tokio::main]
async fn main() {
    let args = cli::parse_args();
    telemetry::init(args.log_format.into());

    let replay = JournalReplay::new(args.to_ledger_config());

    let mut output = std::io::stdout();
    if let Err(e) = replay
        .run(&args.accounts_file, &args.journal_file, &mut output)
        .await
    {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
