//! Per-account mutual exclusion
//!
//! Every read-then-write of an account's balance happens while holding that
//! account's guard. Operations touching two accounts acquire both guards in
//! ascending account-id order, so two transfers over the same pair in
//! opposite directions can never deadlock.
//!
//! Acquisition is bounded by a single deadline covering the whole set; when it
//! expires the guards already taken are released and the caller gets
//! [`LedgerError::Timeout`].

use crate::types::{AccountId, LedgerError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Registry of per-account async mutexes
#[derive(Debug)]
pub struct AccountGuards {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
    timeout: Duration,
}

/// Guards held for a set of accounts; released on drop
#[derive(Debug)]
pub struct GuardSet {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountGuards {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
        }
    }

    fn lock_for(&self, account: &AccountId) -> Arc<Mutex<()>> {
        self.locks
            .entry(account.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Acquire the guards of every account in `accounts`
    ///
    /// Duplicates are collapsed, so passing the same account twice is safe.
    pub async fn acquire(&self, accounts: &[&AccountId]) -> Result<GuardSet, LedgerError> {
        let mut ordered: Vec<AccountId> = accounts.iter().map(|id| (*id).clone()).collect();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now() + self.timeout;
        let mut guards = Vec::with_capacity(ordered.len());

        for account in &ordered {
            let lock = self.lock_for(account);
            match tokio::time::timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    tracing::debug!(account = %account, "guard acquisition timed out");
                    return Err(LedgerError::timeout(account, self.timeout));
                }
            }
        }

        Ok(GuardSet { _guards: guards })
    }
}
