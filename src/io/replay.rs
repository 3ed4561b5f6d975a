//! Journal replay
//!
//! [`JournalReplay`] opens the accounts of an accounts file, replays a journal
//! file row by row through a [`Ledger`], verifies the result and writes the
//! final balances as CSV.
//!
//! Rows the ledger rejects for business reasons (insufficient balance, frozen
//! account, unknown alias, malformed row) are logged and skipped. Fatal
//! ledger errors and I/O failures stop the replay.

use crate::config::LedgerConfig;
use crate::core::Ledger;
use crate::io::csv_format::{
    convert_account_record, convert_journal_record, write_balances_csv, AccountRecord,
    BalanceRow, JournalCommand, JournalRecord,
};
use crate::io::reader::RecordReader;
use crate::types::{AccountId, LedgerError, TransactionId, TransferRequest};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Identity recorded as initiator and actor for every replayed row
const JOURNAL_ACTOR: &str = "journal-replay";

/// Counts of what a replay did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub accounts: usize,
    pub applied: usize,
    pub skipped: usize,
}

/// Replays CSV journals through a fresh in-memory ledger
#[derive(Debug, Clone)]
pub struct JournalReplay {
    config: LedgerConfig,
}

/// Aliases and references seen so far
#[derive(Default)]
struct ReplayState {
    accounts: HashMap<String, AccountId>,
    references: HashMap<String, TransactionId>,
}

impl ReplayState {
    fn account(&self, alias: &str) -> Result<&AccountId, String> {
        self.accounts
            .get(alias)
            .ok_or_else(|| format!("Unknown account alias '{}'", alias))
    }
}

/// A row failure: business rejections are skipped, the rest abort
enum RowError {
    Skip(String),
    Fatal(String),
}

impl From<LedgerError> for RowError {
    fn from(error: LedgerError) -> Self {
        if error.is_fatal() {
            RowError::Fatal(error.to_string())
        } else {
            RowError::Skip(error.to_string())
        }
    }
}

impl JournalReplay {
    pub fn new(config: LedgerConfig) -> Self {
        Self { config }
    }

    /// Replay `journal_path` against the accounts of `accounts_path`
    pub async fn run(
        &self,
        accounts_path: &Path,
        journal_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, String> {
        let ledger = Ledger::in_memory(self.config.clone());
        let mut state = ReplayState::default();
        let mut summary = ReplaySummary::default();

        for row in RecordReader::<AccountRecord>::open(accounts_path)? {
            let (line, record) = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("account row skipped: {}", e);
                    continue;
                }
            };

            match Self::open_account(&ledger, &mut state, record) {
                Ok(()) => summary.accounts += 1,
                Err(RowError::Skip(reason)) => {
                    tracing::warn!(line, "account row skipped: {}", reason);
                }
                Err(RowError::Fatal(reason)) => {
                    return Err(format!("Line {}: {}", line, reason));
                }
            }
        }

        for row in RecordReader::<JournalRecord>::open(journal_path)? {
            let (line, record) = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("journal row skipped: {}", e);
                    summary.skipped += 1;
                    continue;
                }
            };

            match Self::apply(&ledger, &mut state, record).await {
                Ok(()) => summary.applied += 1,
                Err(RowError::Skip(reason)) => {
                    tracing::warn!(line, "journal row skipped: {}", reason);
                    summary.skipped += 1;
                }
                Err(RowError::Fatal(reason)) => {
                    return Err(format!("Line {}: {}", line, reason));
                }
            }
        }

        let report = ledger.verify_ledger().map_err(|e| e.to_string())?;
        if !report.is_consistent() {
            let details: Vec<String> = report
                .discrepancies
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(format!(
                "Ledger verification failed (debits {}, credits {}): {}",
                report.total_debits,
                report.total_credits,
                details.join("; ")
            ));
        }

        let mut rows = Vec::with_capacity(state.accounts.len());
        for (alias, id) in &state.accounts {
            let account = ledger.get_account(id).map_err(|e| e.to_string())?;
            let balance = ledger.get_balance(id).map_err(|e| e.to_string())?;
            rows.push(BalanceRow {
                alias: alias.clone(),
                account_type: account.account_type,
                currency: account.currency.to_string(),
                status: account.status,
                balance,
            });
        }
        write_balances_csv(&rows, output)?;

        tracing::info!(
            accounts = summary.accounts,
            applied = summary.applied,
            skipped = summary.skipped,
            "journal replayed"
        );
        Ok(summary)
    }

    fn open_account(
        ledger: &Ledger,
        state: &mut ReplayState,
        record: AccountRecord,
    ) -> Result<(), RowError> {
        let (alias, request) = convert_account_record(record).map_err(RowError::Skip)?;
        if state.accounts.contains_key(&alias) {
            return Err(RowError::Skip(format!("Duplicate account alias '{}'", alias)));
        }
        let account = ledger.create_account(request)?;
        state.accounts.insert(alias, account.id);
        Ok(())
    }

    async fn apply(
        ledger: &Ledger,
        state: &mut ReplayState,
        record: JournalRecord,
    ) -> Result<(), RowError> {
        match convert_journal_record(record).map_err(RowError::Skip)? {
            JournalCommand::Post {
                tx_type,
                reference,
                from,
                to,
                amount,
                currency,
                description,
            } => {
                let from = state.account(&from).map_err(RowError::Skip)?.clone();
                let to = state.account(&to).map_err(RowError::Skip)?.clone();
                let mut request =
                    TransferRequest::new(JOURNAL_ACTOR, tx_type, from, to, amount, &currency)
                        .described(description);
                if let Some(reference) = &reference {
                    request = request.with_reference(reference.clone());
                }

                let posted = ledger.execute_transaction(request).await?;
                if let Some(reference) = reference {
                    state.references.insert(reference, posted.transaction.id);
                }
            }
            JournalCommand::Reverse { reference, reason } => {
                let id = state
                    .references
                    .get(&reference)
                    .ok_or_else(|| RowError::Skip(format!("Unknown reference '{}'", reference)))?
                    .clone();
                ledger.reverse_transaction(&id, JOURNAL_ACTOR, &reason).await?;
            }
            JournalCommand::SetStatus { account, status } => {
                let id = state.account(&account).map_err(RowError::Skip)?.clone();
                ledger.set_account_status(&id, status, JOURNAL_ACTOR).await?;
            }
        }
        Ok(())
    }
}
