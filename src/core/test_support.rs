//! Store wrappers shared by the unit tests

use crate::core::memory_store::InMemoryStore;
use crate::core::traits::{LedgerStore, Posting};
use crate::types::{
    Account, AccountId, AccountStatus, FinancialTransaction, LedgerEntry, StoreError,
    TransactionId,
};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

/// Delegates to an in-memory store but can refuse every commit
///
/// `default()` fails from the start; `healthy()` commits until
/// [`FailingCommitStore::start_failing`] is called.
pub(crate) struct FailingCommitStore {
    inner: InMemoryStore,
    failing: AtomicBool,
}

impl Default for FailingCommitStore {
    fn default() -> Self {
        Self {
            inner: InMemoryStore::new(),
            failing: AtomicBool::new(true),
        }
    }
}

impl FailingCommitStore {
    pub(crate) fn healthy() -> Self {
        Self {
            inner: InMemoryStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    pub(crate) fn start_failing(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl LedgerStore for FailingCommitStore {
    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        self.inner.insert_account(account)
    }
    fn get_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(id)
    }
    fn accounts_by_owner(&self, owner_id: &str) -> Result<Vec<Account>, StoreError> {
        self.inner.accounts_by_owner(owner_id)
    }
    fn all_accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.inner.all_accounts()
    }
    fn set_account_status(
        &self,
        id: &AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        self.inner.set_account_status(id, status, at)
    }
    fn insert_transaction(&self, transaction: FinancialTransaction) -> Result<(), StoreError> {
        self.inner.insert_transaction(transaction)
    }
    fn get_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<FinancialTransaction>, StoreError> {
        self.inner.get_transaction(id)
    }
    fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<FinancialTransaction>, StoreError> {
        self.inner.find_by_reference(reference)
    }
    fn all_transactions(&self) -> Result<Vec<FinancialTransaction>, StoreError> {
        self.inner.all_transactions()
    }
    fn fail_transaction(
        &self,
        id: &TransactionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.fail_transaction(id, reason, at)
    }
    fn commit_posting(&self, posting: Posting) -> Result<Vec<LedgerEntry>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.commit_posting(posting)
    }
    fn head(&self, account: &AccountId) -> Result<Option<LedgerEntry>, StoreError> {
        self.inner.head(account)
    }
    fn head_sequence(&self, account: &AccountId) -> Result<Option<u64>, StoreError> {
        self.inner.head_sequence(account)
    }
    fn account_entries(
        &self,
        account: &AccountId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<LedgerEntry>, usize), StoreError> {
        self.inner.account_entries(account, offset, limit)
    }
    fn transaction_entries(&self, id: &TransactionId) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.transaction_entries(id)
    }
    fn next_sequence(&self, scope: &str) -> Result<u64, StoreError> {
        self.inner.next_sequence(scope)
    }
}
