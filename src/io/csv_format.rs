//! CSV format handling for account declarations, journal rows and balances
//!
//! This module centralizes all CSV format concerns, providing:
//! - `AccountRecord` and `JournalRecord` structures for deserialization
//! - Conversion from CSV records to ledger requests
//! - Balance output serialization
//!
//! All functions are pure (no I/O) for easy testing.

use crate::types::{AccountStatus, AccountType, NewAccount, OwnerType, TransactionType};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// Row of the accounts file
///
/// Columns: alias, name, type, owner_id, owner_type, currency, system.
/// The alias is how journal rows refer to the account.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountRecord {
    pub alias: String,
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: String,
    pub owner_id: Option<String>,
    pub owner_type: Option<String>,
    pub currency: String,
    pub system: Option<bool>,
}

/// Row of the journal file
///
/// Columns: type, reference, from, to, amount, currency, description.
/// Which columns are required depends on `type`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct JournalRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub reference: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
    pub description: Option<String>,
}

/// What one journal row asks the ledger to do
#[derive(Debug, Clone, PartialEq)]
pub enum JournalCommand {
    /// Execute a transaction between two aliased accounts
    Post {
        tx_type: TransactionType,
        reference: Option<String>,
        from: String,
        to: String,
        amount: Decimal,
        currency: String,
        description: String,
    },

    /// Reverse the transaction posted under `reference`
    Reverse { reference: String, reason: String },

    /// Change the status of an aliased account
    SetStatus {
        account: String,
        status: AccountStatus,
    },
}

/// One line of the balance report
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceRow {
    pub alias: String,
    pub account_type: AccountType,
    pub currency: String,
    pub status: AccountStatus,
    pub balance: Decimal,
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

fn required(field: Option<String>, name: &str, kind: &str) -> Result<String, String> {
    non_empty(field).ok_or_else(|| format!("'{}' row requires {}", kind, name))
}

/// Convert an AccountRecord to its alias and account request
pub fn convert_account_record(record: AccountRecord) -> Result<(String, NewAccount), String> {
    if record.alias.trim().is_empty() {
        return Err("Account row requires an alias".to_string());
    }
    let account_type = AccountType::from_str(&record.account_type)?;

    let mut request = if record.system.unwrap_or(false) {
        NewAccount::system(record.name, account_type, &record.currency)
    } else {
        NewAccount::new(record.name, account_type, &record.currency)
    };
    request.owner_id = non_empty(record.owner_id);
    request.owner_type = non_empty(record.owner_type)
        .map(|owner_type| OwnerType::from_str(&owner_type))
        .transpose()?;

    Ok((record.alias, request))
}

/// Convert a JournalRecord to a JournalCommand
///
/// `type` is matched case-insensitively against the transaction types plus
/// `reverse`, `freeze`, `activate` and `close`.
pub fn convert_journal_record(record: JournalRecord) -> Result<JournalCommand, String> {
    let kind = record.kind.trim().to_lowercase();
    let description = non_empty(record.description).unwrap_or_default();

    match kind.as_str() {
        "reverse" => Ok(JournalCommand::Reverse {
            reference: required(record.reference, "a reference", &kind)?,
            reason: description,
        }),
        "freeze" | "activate" | "close" => {
            let status = match kind.as_str() {
                "freeze" => AccountStatus::Frozen,
                "activate" => AccountStatus::Active,
                _ => AccountStatus::Closed,
            };
            Ok(JournalCommand::SetStatus {
                account: required(record.from, "a from account", &kind)?,
                status,
            })
        }
        _ => {
            let tx_type = TransactionType::from_str(&kind)?;
            let amount_str = required(record.amount, "an amount", &kind)?;
            let amount = Decimal::from_str(amount_str.trim())
                .map_err(|_| format!("Invalid amount '{}'", amount_str))?;

            Ok(JournalCommand::Post {
                tx_type,
                reference: non_empty(record.reference),
                from: required(record.from, "a from account", &kind)?,
                to: required(record.to, "a to account", &kind)?,
                amount,
                currency: required(record.currency, "a currency", &kind)?,
                description,
            })
        }
    }
}

/// Write balances to CSV format
///
/// Writes rows with columns: account, type, currency, status, balance.
/// Rows are sorted by alias for deterministic output. Balances are printed
/// exactly, padded to at least two decimal places.
pub fn write_balances_csv(rows: &[BalanceRow], output: &mut dyn Write) -> Result<(), String> {
    use csv::Writer;

    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["account", "type", "currency", "status", "balance"])
        .map_err(|e| format!("Failed to write CSV header: {}", e))?;

    let mut sorted_rows = rows.to_vec();
    sorted_rows.sort_by(|a, b| a.alias.cmp(&b.alias));

    for row in sorted_rows {
        // Never print a negative zero
        let mut balance = if row.balance.is_zero() {
            Decimal::ZERO
        } else {
            row.balance.normalize()
        };
        if balance.scale() < 2 {
            balance.rescale(2);
        }
        writer
            .write_record(&[
                row.alias,
                row.account_type.to_string(),
                row.currency,
                row.status.to_string(),
                balance.to_string(),
            ])
            .map_err(|e| format!("Failed to write balance record: {}", e))?;
    }

    writer
        .flush()
        .map_err(|e| format!("Failed to flush output: {}", e))?;

    Ok(())
}
