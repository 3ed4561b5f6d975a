//! Ledger reconciliation
//!
//! [`LedgerVerifier`] re-derives everything the ledger stores and reports any
//! disagreement instead of failing on the first one:
//!
//! - each account's `balance_after` chain must follow the sign convention in
//!   posting order, starting from zero
//! - the newest snapshot must equal the fold of all entries
//! - it must also equal the fold of the entries left after removing reversed
//!   originals and the reversal entries that offset them
//! - every COMPLETED or REVERSED transaction must own one DEBIT and one CREDIT
//!   of its total amount on accounts in its currency; FAILED and PROCESSING
//!   transactions must own none
//! - total debits must equal total credits
//!
//! The checks read the store without taking guards. On a ledger that is still
//! taking postings the trial balance may catch a commit half-read; run it on a
//! quiescent ledger for an exact answer.

use crate::core::balance::SignConvention;
use crate::core::traits::LedgerStore;
use crate::types::{
    Account, AccountId, EntryType, FinancialTransaction, LedgerEntry, LedgerError,
    TransactionId, TransactionStatus,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A single inconsistency found by [`LedgerVerifier::run`]
#[derive(Debug, Clone, PartialEq)]
pub enum Discrepancy {
    /// An entry's `balance_after` does not follow from the previous one
    BrokenChain {
        account: AccountId,
        sequence: u64,
        expected: Decimal,
        recorded: Decimal,
    },

    /// The newest snapshot disagrees with the fold of all entries
    SnapshotMismatch {
        account: AccountId,
        snapshot: Decimal,
        folded: Decimal,
    },

    /// Removing reversed pairs changes the balance
    ReversalMismatch {
        account: AccountId,
        snapshot: Decimal,
        effective: Decimal,
    },

    /// A transaction's entries break the double-entry rule
    Unbalanced {
        transaction: TransactionId,
        detail: String,
    },
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::BrokenChain {
                account,
                sequence,
                expected,
                recorded,
            } => write!(
                f,
                "account {}: entry #{} records {} but the chain gives {}",
                account, sequence, recorded, expected
            ),
            Discrepancy::SnapshotMismatch {
                account,
                snapshot,
                folded,
            } => write!(
                f,
                "account {}: snapshot {} differs from folded sum {}",
                account, snapshot, folded
            ),
            Discrepancy::ReversalMismatch {
                account,
                snapshot,
                effective,
            } => write!(
                f,
                "account {}: snapshot {} differs from non-reversed sum {}",
                account, snapshot, effective
            ),
            Discrepancy::Unbalanced {
                transaction,
                detail,
            } => write!(f, "transaction {}: {}", transaction, detail),
        }
    }
}

/// Outcome of a full reconciliation pass
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    pub accounts_checked: usize,
    pub transactions_checked: usize,
    pub total_debits: Decimal,
    pub total_credits: Decimal,
    pub discrepancies: Vec<Discrepancy>,
}

impl VerificationReport {
    pub fn is_balanced(&self) -> bool {
        self.total_debits == self.total_credits
    }

    /// No discrepancies and a balanced trial balance
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty() && self.is_balanced()
    }
}

/// Recomputes balances and double-entry pairs from the raw entry log
pub struct LedgerVerifier {
    store: Arc<dyn LedgerStore>,
    convention: SignConvention,
}

impl LedgerVerifier {
    pub fn new(store: Arc<dyn LedgerStore>, convention: SignConvention) -> Self {
        Self { store, convention }
    }

    pub fn run(&self) -> Result<VerificationReport, LedgerError> {
        let accounts = self.store.all_accounts()?;
        let transactions = self.store.all_transactions()?;

        let mut report = VerificationReport {
            accounts_checked: accounts.len(),
            transactions_checked: transactions.len(),
            total_debits: Decimal::ZERO,
            total_credits: Decimal::ZERO,
            discrepancies: Vec::new(),
        };

        for account in &accounts {
            let (entries, _) = self.store.account_entries(&account.id, 0, usize::MAX)?;
            self.check_account(account, &entries, &mut report)?;
        }

        let by_id: HashMap<&AccountId, &Account> =
            accounts.iter().map(|account| (&account.id, account)).collect();
        for transaction in &transactions {
            let entries = self.store.transaction_entries(&transaction.id)?;
            if let Some(detail) = Self::check_transaction(transaction, &entries, &by_id) {
                report.discrepancies.push(Discrepancy::Unbalanced {
                    transaction: transaction.id.clone(),
                    detail,
                });
            }
        }

        if report.is_consistent() {
            tracing::info!(
                accounts = report.accounts_checked,
                transactions = report.transactions_checked,
                "ledger verified"
            );
        } else {
            tracing::error!(
                discrepancies = report.discrepancies.len(),
                total_debits = %report.total_debits,
                total_credits = %report.total_credits,
                "ledger verification found inconsistencies"
            );
        }
        Ok(report)
    }

    fn check_account(
        &self,
        account: &Account,
        entries: &[LedgerEntry],
        report: &mut VerificationReport,
    ) -> Result<(), LedgerError> {
        let mut running = Decimal::ZERO;
        for entry in entries {
            running = self
                .convention
                .apply(account.account_type, running, entry.entry_type, entry.amount)?;
            if running != entry.balance_after {
                report.discrepancies.push(Discrepancy::BrokenChain {
                    account: account.id.clone(),
                    sequence: entry.sequence,
                    expected: running,
                    recorded: entry.balance_after,
                });
                // Keep checking the rest of the chain against what was recorded
                running = entry.balance_after;
            }

            let total = match entry.entry_type {
                EntryType::Debit => &mut report.total_debits,
                EntryType::Credit => &mut report.total_credits,
            };
            *total = total
                .checked_add(entry.amount)
                .ok_or_else(|| LedgerError::invalid_amount(entry.amount))?;
        }

        let snapshot = entries
            .last()
            .map_or(Decimal::ZERO, |entry| entry.balance_after);
        let folded = self.convention.fold(account.account_type, entries)?;
        if folded != snapshot {
            report.discrepancies.push(Discrepancy::SnapshotMismatch {
                account: account.id.clone(),
                snapshot,
                folded,
            });
        }

        let effective = self.convention.fold(
            account.account_type,
            entries
                .iter()
                .filter(|entry| !entry.is_reversed && !entry.is_reversal()),
        )?;
        if effective != snapshot {
            report.discrepancies.push(Discrepancy::ReversalMismatch {
                account: account.id.clone(),
                snapshot,
                effective,
            });
        }
        Ok(())
    }

    fn check_transaction(
        transaction: &FinancialTransaction,
        entries: &[LedgerEntry],
        accounts: &HashMap<&AccountId, &Account>,
    ) -> Option<String> {
        match transaction.status {
            TransactionStatus::Processing | TransactionStatus::Failed => {
                return (!entries.is_empty()).then(|| {
                    format!(
                        "{} transaction owns {} entries",
                        transaction.status,
                        entries.len()
                    )
                });
            }
            TransactionStatus::Completed | TransactionStatus::Reversed => {}
        }

        if entries.len() != 2 {
            return Some(format!("expected 2 entries, found {}", entries.len()));
        }
        if entries[0].entry_type == entries[1].entry_type {
            return Some(format!("both entries are {}", entries[0].entry_type));
        }
        if let Some(entry) = entries
            .iter()
            .find(|entry| entry.amount != transaction.total_amount)
        {
            return Some(format!(
                "entry {} amount {} differs from total {}",
                entry.id, entry.amount, transaction.total_amount
            ));
        }
        for entry in entries {
            match accounts.get(&entry.account_id) {
                Some(account) if account.currency == transaction.currency => {}
                Some(account) => {
                    return Some(format!(
                        "account {} is in {}, transaction in {}",
                        account.id, account.currency, transaction.currency
                    ))
                }
                None => return Some(format!("entry {} points at unknown account", entry.id)),
            }
        }
        if transaction.status == TransactionStatus::Reversed
            && entries.iter().any(|entry| !entry.is_reversed)
        {
            return Some("REVERSED transaction has entries not flagged is_reversed".to_string());
        }
        None
    }
}

impl fmt::Debug for LedgerVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerVerifier")
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}
