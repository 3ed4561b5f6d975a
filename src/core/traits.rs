//! Core traits for storage and auditing
//!
//! The ledger never talks to a process-wide client. Every component receives
//! an `Arc<dyn LedgerStore>` (and the registry an `Arc<dyn AuditSink>`) at
//! construction, so backends can be swapped in tests and in production.

use crate::types::{
    Account, AccountId, AccountStatus, EntryId, FinancialTransaction, LedgerEntry, StoreError,
    TransactionId, TransactionStatus,
};
use chrono::{DateTime, Utc};

/// Status change applied as part of a [`Posting`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub transaction_id: TransactionId,
    pub status: TransactionStatus,

    /// Becomes `completed_at` when `status` is COMPLETED
    pub at: DateTime<Utc>,
}

/// Everything one ledger write commits, all-or-nothing
///
/// The store must apply every part or none of it. `expected_heads` carries
/// the sequence of the newest entry each touched account had when the
/// posting was prepared (`None` for an account with no entries); the store
/// rejects the posting with [`StoreError::Conflict`] if any head moved.
#[derive(Debug, Clone, Default)]
pub struct Posting {
    /// New entries, in the order they take effect; `sequence` is assigned by the store
    pub entries: Vec<LedgerEntry>,

    pub expected_heads: Vec<(AccountId, Option<u64>)>,

    /// Entries to flag `is_reversed = true`
    pub reversed_entries: Vec<EntryId>,

    pub status_changes: Vec<StatusChange>,
}

/// Storage layer for accounts, transactions and the append-only entry log
///
/// Implementations must be safe to share across tasks. Only
/// [`LedgerStore::commit_posting`] may write entries.
pub trait LedgerStore: Send + Sync {
    /// Insert a new account; `Duplicate` if the id or account number exists
    fn insert_account(&self, account: Account) -> Result<(), StoreError>;

    fn get_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError>;

    /// All accounts (any status) owned by `owner_id`
    fn accounts_by_owner(&self, owner_id: &str) -> Result<Vec<Account>, StoreError>;

    fn all_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Overwrite the status of an account and return the updated row
    fn set_account_status(
        &self,
        id: &AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    /// Insert a PROCESSING transaction row
    ///
    /// Fails with `ReferenceTaken` if a non-FAILED transaction already holds
    /// the same external reference.
    fn insert_transaction(&self, transaction: FinancialTransaction) -> Result<(), StoreError>;

    fn get_transaction(&self, id: &TransactionId)
        -> Result<Option<FinancialTransaction>, StoreError>;

    /// The non-FAILED transaction holding `reference`, if any
    fn find_by_reference(&self, reference: &str)
        -> Result<Option<FinancialTransaction>, StoreError>;

    fn all_transactions(&self) -> Result<Vec<FinancialTransaction>, StoreError>;

    /// Move a PROCESSING transaction to FAILED and release its reference
    fn fail_transaction(
        &self,
        id: &TransactionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Atomically commit a [`Posting`], returning the stored entries
    fn commit_posting(&self, posting: Posting) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Most recently posted entry of an account
    fn head(&self, account: &AccountId) -> Result<Option<LedgerEntry>, StoreError>;

    /// Sequence of the most recently posted entry of an account
    ///
    /// Cheap check used to tell whether a cached balance is still current.
    fn head_sequence(&self, account: &AccountId) -> Result<Option<u64>, StoreError>;

    /// A window of an account's entries in posting order, plus the total count
    fn account_entries(
        &self,
        account: &AccountId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<LedgerEntry>, usize), StoreError>;

    /// Entries of one transaction in posting order
    fn transaction_entries(&self, id: &TransactionId) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Atomically increment and return the counter for `scope` (first value is 1)
    fn next_sequence(&self, scope: &str) -> Result<u64, StoreError>;
}

/// Audit record of an account status change
#[derive(Debug, Clone, PartialEq)]
pub struct StatusAudit {
    pub account_id: AccountId,
    pub from: AccountStatus,
    pub to: AccountStatus,
    pub actor_id: String,
    pub at: DateTime<Utc>,
}

/// Receiver for audit records emitted by the account registry
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &StatusAudit);
}

/// Default sink: structured events on the `audit` tracing target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &StatusAudit) {
        tracing::info!(
            target: "audit",
            account_id = %event.account_id,
            from = %event.from,
            to = %event.to,
            actor_id = %event.actor_id,
            at = %event.at,
            "account status changed"
        );
    }
}
