//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `id`: Opaque identifiers
//! - `account`: Account-related types
//! - `transaction`: Transaction headers and transfer requests
//! - `entry`: Ledger entries and statement paging
//! - `error`: Error types for the ledger engine

pub mod account;
pub mod entry;
pub mod error;
pub mod id;
pub mod transaction;

pub use account::{
    Account, AccountFilter, AccountStatus, AccountType, Currency, Metadata, NewAccount, OwnerType,
};
pub use entry::{EntryPage, EntryType, LedgerEntry, Pagination};
pub use error::{LedgerError, StoreError};
pub use id::{AccountId, EntryId, TransactionId};
pub use transaction::{
    FinancialTransaction, PostedTransaction, TransactionStatus, TransactionType, TransferRequest,
};
