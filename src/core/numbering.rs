//! Account and transaction numbering
//!
//! Transaction numbers are `TXN-YYYYMMDD-NNNNNN`, sequential within a UTC day.
//! The counter is an atomic increment supplied by the store, so concurrent
//! callers can never be handed the same number.
//!
//! Account numbers are `{TYPE}-{OWNER_SCOPE}-{TIMESTAMP}-{RANDOM}`. They are
//! not sequential; uniqueness is enforced by the store's index and the
//! registry regenerates on collision.

use crate::core::traits::LedgerStore;
use crate::types::{AccountType, LedgerError, OwnerType};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use std::sync::Arc;

/// Generates account and transaction numbers
#[derive(Clone)]
pub struct NumberingService {
    store: Arc<dyn LedgerStore>,
}

impl NumberingService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Next transaction number for the current UTC day
    pub fn next_transaction_number(&self) -> Result<String, LedgerError> {
        self.next_transaction_number_on(Utc::now().date_naive())
    }

    /// Next transaction number for a given day
    pub fn next_transaction_number_on(&self, day: NaiveDate) -> Result<String, LedgerError> {
        let scope = format!("TXN-{}", day.format("%Y%m%d"));
        let sequence = self.store.next_sequence(&scope)?;
        Ok(format!("{}-{:06}", scope, sequence))
    }

    /// A fresh account number candidate
    pub fn next_account_number(&self, account_type: AccountType, scope: OwnerType) -> String {
        Self::account_number_at(account_type, scope, Utc::now())
    }

    fn account_number_at(account_type: AccountType, scope: OwnerType, at: DateTime<Utc>) -> String {
        let random: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
        format!(
            "{}-{}-{}-{:06X}",
            account_type.code(),
            scope.scope_code(),
            at.format("%Y%m%d%H%M%S"),
            random
        )
    }
}

impl std::fmt::Debug for NumberingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NumberingService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::InMemoryStore;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn service() -> NumberingService {
        NumberingService::new(Arc::new(InMemoryStore::new()))
    }

    #[test]
    fn test_transaction_numbers_are_sequential_within_a_day() {
        let numbering = service();
        let day = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();

        assert_eq!(
            numbering.next_transaction_number_on(day).unwrap(),
            "TXN-20261017-000001"
        );
        assert_eq!(
            numbering.next_transaction_number_on(day).unwrap(),
            "TXN-20261017-000002"
        );
    }

    #[test]
    fn test_transaction_numbers_restart_each_day() {
        let numbering = service();
        let first = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let second = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();

        numbering.next_transaction_number_on(first).unwrap();
        numbering.next_transaction_number_on(first).unwrap();

        assert_eq!(
            numbering.next_transaction_number_on(second).unwrap(),
            "TXN-20261018-000001"
        );
    }

    #[test]
    fn test_transaction_numbers_never_collide_across_threads() {
        let numbering = service();
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let numbering = numbering.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| numbering.next_transaction_number_on(day).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let numbers: HashSet<String> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(numbers.len(), 800);
        assert!(numbers.contains("TXN-20260101-000800"));
    }

    #[test]
    fn test_account_number_format() {
        let at = Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 15).unwrap();
        let number =
            NumberingService::account_number_at(AccountType::Asset, OwnerType::Merchant, at);

        let parts: Vec<&str> = number.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "AST");
        assert_eq!(parts[1], "MER");
        assert_eq!(parts[2], "20261017093015");
        assert_eq!(parts[3].len(), 6);
        assert!(parts[3]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
