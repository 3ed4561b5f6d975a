//! Ledger entry types
//!
//! Entries are the only persisted representation of money movement. They are
//! append-only: the single permitted mutation is flipping `is_reversed`.

use super::id::{AccountId, EntryId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of a double-entry posting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryType {
    Debit,
    Credit,
}

impl EntryType {
    /// The opposite side, used when offsetting an entry
    pub fn flipped(self) -> Self {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Debit => "DEBIT",
            EntryType::Credit => "CREDIT",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One half of a transaction's effect on one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub transaction_id: TransactionId,
    pub entry_type: EntryType,

    /// Always positive, in the account's currency
    pub amount: Decimal,

    /// Derived balance of the account immediately after this entry
    pub balance_after: Decimal,

    pub description: String,

    /// The parent transaction's `transaction_number`
    pub reference_number: String,

    pub is_reversed: bool,

    /// Set only on reversal entries
    pub original_entry_id: Option<EntryId>,

    /// Global posting order, assigned by the store at commit; 0 until then
    pub sequence: u64,

    pub posted_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Whether this entry offsets another one
    pub fn is_reversal(&self) -> bool {
        self.original_entry_id.is_some()
    }
}

/// Offset/limit window over an account's entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub offset: usize,

    /// 0 selects the configured default page size
    pub limit: usize,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize) -> Self {
        Pagination { offset, limit }
    }
}

/// One page of an account statement, in posting order
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPage {
    pub entries: Vec<LedgerEntry>,

    /// Total number of entries on the account
    pub total: usize,

    /// Offset of the next page, if any
    pub next_offset: Option<usize>,
}
