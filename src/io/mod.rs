//! I/O module
//!
//! Handles CSV parsing, journal replay and balance output.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (record conversion, output serialization)
//! - `reader` - Streaming CSV reader with iterator interface
//! - `replay` - Replays a journal through a ledger and reports balances

pub mod csv_format;
pub mod reader;
pub mod replay;

pub use csv_format::{
    convert_account_record, convert_journal_record, write_balances_csv, AccountRecord,
    BalanceRow, JournalCommand, JournalRecord,
};
pub use reader::RecordReader;
pub use replay::{JournalReplay, ReplaySummary};
