//! Balance derivation
//!
//! Balances are never stored on accounts. The authoritative balance of an
//! account is the `balance_after` of its most recently posted entry (by posting
//! order), or zero when it has none.
//!
//! # Sign conventions
//!
//! [`SignConvention::Standard`] is textbook double entry:
//!
//! | account type                  | DEBIT    | CREDIT   |
//! |-------------------------------|----------|----------|
//! | ASSET, EXPENSE                | increase | decrease |
//! | LIABILITY, EQUITY, REVENUE    | decrease | increase |
//!
//! [`SignConvention::Custodial`] reports every balance as funds held for the
//! account's owner: CREDIT increases and DEBIT decreases, whatever the type.
//! The transaction processor always debits the source account, so this is
//! the convention under which a transfer out of a wallet lowers it.
//!
//! # Cache
//!
//! [`BalanceCalculator::balance`] serves a last-known-balance cache. Every
//! cached value is tagged with the posting sequence it reflects and an update
//! only lands if its sequence is newer, so a reader that loaded an old head
//! can never overwrite the write-through value of a later commit. A cached
//! value is served only while it matches the store's current head sequence,
//! so commits made by any other writer on the same store invalidate it. Write
//! decisions never use the cache: they call [`BalanceCalculator::current`]
//! while holding the account guard.

use crate::core::traits::LedgerStore;
use crate::types::{AccountId, AccountType, EntryType, LedgerEntry, LedgerError};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;

/// How entry types move balances for each account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignConvention {
    /// ASSET/EXPENSE are debit-normal; LIABILITY/EQUITY/REVENUE credit-normal
    Standard,

    /// Every account is credit-normal
    #[default]
    Custodial,
}

impl SignConvention {
    /// Whether an entry of `entry_type` increases an account of `account_type`
    pub fn increases(self, account_type: AccountType, entry_type: EntryType) -> bool {
        let debit_normal = match self {
            SignConvention::Standard => {
                matches!(account_type, AccountType::Asset | AccountType::Expense)
            }
            SignConvention::Custodial => false,
        };
        match entry_type {
            EntryType::Debit => debit_normal,
            EntryType::Credit => !debit_normal,
        }
    }

    /// Balance after applying one entry to `balance`
    pub fn apply(
        self,
        account_type: AccountType,
        balance: Decimal,
        entry_type: EntryType,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let next = if self.increases(account_type, entry_type) {
            balance.checked_add(amount)
        } else {
            balance.checked_sub(amount)
        };
        next.ok_or_else(|| LedgerError::invalid_amount(amount))
    }

    /// Fold entries (in posting order) from a zero balance
    pub fn fold<'a>(
        self,
        account_type: AccountType,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Result<Decimal, LedgerError> {
        entries.into_iter().try_fold(Decimal::ZERO, |balance, entry| {
            self.apply(account_type, balance, entry.entry_type, entry.amount)
        })
    }
}

/// Balance of an account together with the head it was read at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub balance: Decimal,

    /// Sequence of the newest entry, `None` if the account has no entries
    pub head: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct CachedBalance {
    sequence: u64,
    balance: Decimal,
}

/// Derives balances from the entry store
pub struct BalanceCalculator {
    store: Arc<dyn LedgerStore>,
    convention: SignConvention,
    cache: Option<DashMap<AccountId, CachedBalance>>,
}

impl BalanceCalculator {
    pub fn new(store: Arc<dyn LedgerStore>, convention: SignConvention, cache: bool) -> Self {
        Self {
            store,
            convention,
            cache: cache.then(DashMap::new),
        }
    }

    pub fn convention(&self) -> SignConvention {
        self.convention
    }

    /// Authoritative balance read straight from the store
    ///
    /// Callers making a write decision must hold the account guard.
    pub fn current(&self, account: &AccountId) -> Result<BalanceSnapshot, LedgerError> {
        let snapshot = match self.store.head(account)? {
            Some(entry) => BalanceSnapshot {
                balance: entry.balance_after,
                head: Some(entry.sequence),
            },
            None => BalanceSnapshot {
                balance: Decimal::ZERO,
                head: None,
            },
        };
        if let Some(sequence) = snapshot.head {
            self.remember(account, sequence, snapshot.balance);
        }
        Ok(snapshot)
    }

    /// Balance for display, served from the cache when possible
    ///
    /// A cached value is only used while the store's head for the account
    /// still carries the sequence it was cached at. Writes through another
    /// calculator sharing the store move the head and force a reload.
    pub fn balance(&self, account: &AccountId) -> Result<Decimal, LedgerError> {
        let Some(cache) = &self.cache else {
            return Ok(self.current(account)?.balance);
        };

        let Some(head) = self.store.head_sequence(account)? else {
            self.invalidate(account);
            return Ok(Decimal::ZERO);
        };
        let cached = cache.get(account).map(|entry| *entry);
        match cached {
            Some(cached) if cached.sequence == head => Ok(cached.balance),
            _ => Ok(self.current(account)?.balance),
        }
    }

    /// Recompute a balance by folding the full history, ignoring snapshots
    pub fn derive(
        &self,
        account: &AccountId,
        account_type: AccountType,
    ) -> Result<Decimal, LedgerError> {
        let (entries, _) = self.store.account_entries(account, 0, usize::MAX)?;
        self.convention.fold(account_type, &entries)
    }

    /// Write-through after a commit
    pub fn observe(&self, entries: &[LedgerEntry]) {
        for entry in entries {
            self.remember(&entry.account_id, entry.sequence, entry.balance_after);
        }
    }

    /// Drop the cached balance of an account
    pub fn invalidate(&self, account: &AccountId) {
        if let Some(cache) = &self.cache {
            cache.remove(account);
        }
    }

    fn remember(&self, account: &AccountId, sequence: u64, balance: Decimal) {
        let Some(cache) = &self.cache else {
            return;
        };
        let mut slot = cache
            .entry(account.clone())
            .or_insert(CachedBalance { sequence, balance });
        if sequence > slot.sequence {
            *slot = CachedBalance { sequence, balance };
        }
    }
}

impl std::fmt::Debug for BalanceCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceCalculator")
            .field("convention", &self.convention)
            .field("cached", &self.cache.as_ref().map(DashMap::len))
            .finish()
    }
}
