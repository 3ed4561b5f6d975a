//! In-memory storage backend
//!
//! This module provides [`InMemoryStore`], a thread-safe [`LedgerStore`]
//! used by the CLI, the tests and any embedding that does not need
//! durability.
//!
//! # Design
//!
//! - Accounts and the account-number index live in `DashMap`s: account writes
//!   never need to be atomic with entry writes.
//! - Transactions, entries and their indices live together in one
//!   [`Journal`] behind a `RwLock`. A [`Posting`] is validated and applied
//!   while holding the write lock, which gives the all-or-nothing commit the
//!   ledger relies on and a single global posting order.
//! - Sequence counters are `AtomicU64`s keyed by scope.

use crate::core::traits::{LedgerStore, Posting};
use crate::types::{
    Account, AccountId, AccountStatus, EntryId, FinancialTransaction, LedgerEntry, StoreError,
    TransactionId, TransactionStatus,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Transactions and the append-only entry log
#[derive(Debug, Default)]
struct Journal {
    transactions: HashMap<TransactionId, FinancialTransaction>,

    /// External reference -> live (non-FAILED) transaction
    references: HashMap<String, TransactionId>,

    /// Entry at position `i` has sequence `i + 1`
    entries: Vec<LedgerEntry>,

    entry_positions: HashMap<EntryId, usize>,
    by_account: HashMap<AccountId, Vec<usize>>,
    by_transaction: HashMap<TransactionId, Vec<usize>>,
}

impl Journal {
    fn head_position(&self, account: &AccountId) -> Option<usize> {
        self.by_account
            .get(account)
            .and_then(|positions| positions.last().copied())
    }

    fn head_sequence(&self, account: &AccountId) -> Option<u64> {
        self.head_position(account)
            .map(|position| self.entries[position].sequence)
    }

    fn validate(&self, posting: &Posting) -> Result<(), StoreError> {
        for (account, expected) in &posting.expected_heads {
            let found = self.head_sequence(account);
            if found != *expected {
                return Err(StoreError::Conflict {
                    account: account.clone(),
                    expected: *expected,
                    found,
                });
            }
        }

        for entry in &posting.entries {
            if !self.transactions.contains_key(&entry.transaction_id) {
                return Err(StoreError::Missing {
                    kind: "transaction",
                    id: entry.transaction_id.to_string(),
                });
            }
            if self.entry_positions.contains_key(&entry.id) {
                return Err(StoreError::Duplicate {
                    index: "entry_id",
                    value: entry.id.to_string(),
                });
            }
        }

        for id in &posting.reversed_entries {
            if !self.entry_positions.contains_key(id) {
                return Err(StoreError::Missing {
                    kind: "entry",
                    id: id.to_string(),
                });
            }
        }

        for change in &posting.status_changes {
            let transaction = self
                .transactions
                .get(&change.transaction_id)
                .ok_or_else(|| StoreError::Missing {
                    kind: "transaction",
                    id: change.transaction_id.to_string(),
                })?;
            if !transaction.status.can_transition_to(change.status) {
                return Err(StoreError::IllegalTransition {
                    transaction: change.transaction_id.clone(),
                    from: transaction.status,
                    to: change.status,
                });
            }
        }

        Ok(())
    }

    /// Apply a validated posting; cannot fail
    fn apply(&mut self, posting: Posting) -> Vec<LedgerEntry> {
        let mut stored = Vec::with_capacity(posting.entries.len());

        for mut entry in posting.entries {
            let position = self.entries.len();
            entry.sequence = position as u64 + 1;

            self.by_account
                .entry(entry.account_id.clone())
                .or_default()
                .push(position);
            self.by_transaction
                .entry(entry.transaction_id.clone())
                .or_default()
                .push(position);
            self.entry_positions.insert(entry.id.clone(), position);

            stored.push(entry.clone());
            self.entries.push(entry);
        }

        for id in &posting.reversed_entries {
            if let Some(&position) = self.entry_positions.get(id) {
                self.entries[position].is_reversed = true;
            }
        }

        for change in posting.status_changes {
            if let Some(transaction) = self.transactions.get_mut(&change.transaction_id) {
                transaction.status = change.status;
                if change.status == TransactionStatus::Completed {
                    transaction.completed_at = Some(change.at);
                }
            }
        }

        stored
    }
}

/// Thread-safe in-memory [`LedgerStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    accounts: DashMap<AccountId, Account>,
    account_numbers: DashMap<String, AccountId>,
    journal: RwLock<Journal>,
    sequences: DashMap<String, AtomicU64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Journal>, StoreError> {
        self.journal
            .read()
            .map_err(|_| StoreError::Backend("journal lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Journal>, StoreError> {
        self.journal
            .write()
            .map_err(|_| StoreError::Backend("journal lock poisoned".to_string()))
    }
}

impl LedgerStore for InMemoryStore {
    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        if self.accounts.contains_key(&account.id) {
            return Err(StoreError::Duplicate {
                index: "account_id",
                value: account.id.to_string(),
            });
        }

        // Claim the account number first; the unique index decides collisions
        let claimed = self
            .account_numbers
            .entry(account.account_number.clone())
            .or_insert_with(|| account.id.clone())
            .clone();
        if claimed != account.id {
            return Err(StoreError::Duplicate {
                index: "account_number",
                value: account.account_number,
            });
        }

        self.accounts.insert(account.id.clone(), account);
        Ok(())
    }

    fn get_account(&self, id: &AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(id).map(|entry| entry.value().clone()))
    }

    fn accounts_by_owner(&self, owner_id: &str) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .filter(|entry| entry.value().owner_id.as_deref() == Some(owner_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn all_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    fn set_account_status(
        &self,
        id: &AccountId,
        status: AccountStatus,
        at: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut account = self.accounts.get_mut(id).ok_or_else(|| StoreError::Missing {
            kind: "account",
            id: id.to_string(),
        })?;
        account.status = status;
        account.updated_at = at;
        Ok(account.clone())
    }

    fn insert_transaction(&self, transaction: FinancialTransaction) -> Result<(), StoreError> {
        let mut journal = self.write()?;

        if journal.transactions.contains_key(&transaction.id) {
            return Err(StoreError::Duplicate {
                index: "transaction_id",
                value: transaction.id.to_string(),
            });
        }

        if let Some(reference) = &transaction.external_reference {
            if let Some(existing) = journal.references.get(reference) {
                return Err(StoreError::ReferenceTaken {
                    reference: reference.clone(),
                    existing: existing.clone(),
                });
            }
            journal
                .references
                .insert(reference.clone(), transaction.id.clone());
        }

        journal
            .transactions
            .insert(transaction.id.clone(), transaction);
        Ok(())
    }

    fn get_transaction(
        &self,
        id: &TransactionId,
    ) -> Result<Option<FinancialTransaction>, StoreError> {
        Ok(self.read()?.transactions.get(id).cloned())
    }

    fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<FinancialTransaction>, StoreError> {
        let journal = self.read()?;
        Ok(journal
            .references
            .get(reference)
            .and_then(|id| journal.transactions.get(id))
            .cloned())
    }

    fn all_transactions(&self) -> Result<Vec<FinancialTransaction>, StoreError> {
        Ok(self.read()?.transactions.values().cloned().collect())
    }

    fn fail_transaction(
        &self,
        id: &TransactionId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut guard = self.write()?;
        let journal = &mut *guard;

        let transaction = journal
            .transactions
            .get_mut(id)
            .ok_or_else(|| StoreError::Missing {
                kind: "transaction",
                id: id.to_string(),
            })?;
        if !transaction
            .status
            .can_transition_to(TransactionStatus::Failed)
        {
            return Err(StoreError::IllegalTransition {
                transaction: id.clone(),
                from: transaction.status,
                to: TransactionStatus::Failed,
            });
        }

        transaction.status = TransactionStatus::Failed;
        transaction.failure_reason = Some(reason.to_string());
        transaction.failed_at = Some(at);

        // A failed attempt must not block a retry with the same reference
        if let Some(reference) = &transaction.external_reference {
            if journal.references.get(reference) == Some(id) {
                journal.references.remove(reference);
            }
        }
        Ok(())
    }

    fn commit_posting(&self, posting: Posting) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut journal = self.write()?;
        journal.validate(&posting)?;
        Ok(journal.apply(posting))
    }

    fn head(&self, account: &AccountId) -> Result<Option<LedgerEntry>, StoreError> {
        let journal = self.read()?;
        Ok(journal
            .head_position(account)
            .map(|position| journal.entries[position].clone()))
    }

    fn head_sequence(&self, account: &AccountId) -> Result<Option<u64>, StoreError> {
        Ok(self.read()?.head_sequence(account))
    }

    fn account_entries(
        &self,
        account: &AccountId,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<LedgerEntry>, usize), StoreError> {
        let journal = self.read()?;
        let positions = journal
            .by_account
            .get(account)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let total = positions.len();
        let start = offset.min(total);
        let end = offset.saturating_add(limit).min(total);

        let entries = positions[start..end]
            .iter()
            .map(|&position| journal.entries[position].clone())
            .collect();
        Ok((entries, total))
    }

    fn transaction_entries(&self, id: &TransactionId) -> Result<Vec<LedgerEntry>, StoreError> {
        let journal = self.read()?;
        Ok(journal
            .by_transaction
            .get(id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| journal.entries[position].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn next_sequence(&self, scope: &str) -> Result<u64, StoreError> {
        let counter = self
            .sequences
            .entry(scope.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
