//! Transaction-related types for the ledger
//!
//! A [`FinancialTransaction`] is the header row for one money movement. The
//! movement itself lives in exactly two [`LedgerEntry`] rows once the
//! transaction is COMPLETED.

use super::account::Currency;
use super::entry::LedgerEntry;
use super::id::{AccountId, TransactionId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Business classification of a money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Transfer,
    Payment,
    Deposit,
    Withdrawal,
    Fee,
    Commission,
    Refund,
    Adjustment,
    Exchange,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Payment => "PAYMENT",
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Fee => "FEE",
            TransactionType::Commission => "COMMISSION",
            TransactionType::Refund => "REFUND",
            TransactionType::Adjustment => "ADJUSTMENT",
            TransactionType::Exchange => "EXCHANGE",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TRANSFER" => Ok(TransactionType::Transfer),
            "PAYMENT" => Ok(TransactionType::Payment),
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "FEE" => Ok(TransactionType::Fee),
            "COMMISSION" => Ok(TransactionType::Commission),
            "REFUND" => Ok(TransactionType::Refund),
            "ADJUSTMENT" => Ok(TransactionType::Adjustment),
            "EXCHANGE" => Ok(TransactionType::Exchange),
            other => Err(format!("Invalid transaction type: '{}'", other)),
        }
    }
}

/// Processing state of a transaction
///
/// ```text
/// PROCESSING ──► COMPLETED ──► REVERSED
///      │
///      └───────► FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Processing,
    Completed,
    Failed,
    Reversed,
}

impl TransactionStatus {
    /// Whether a stored transaction may move from `self` to `next`
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Processing, TransactionStatus::Completed)
                | (TransactionStatus::Processing, TransactionStatus::Failed)
                | (TransactionStatus::Completed, TransactionStatus::Reversed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Processing => "PROCESSING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Reversed => "REVERSED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Header row of a money movement between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub id: TransactionId,

    /// `TXN-YYYYMMDD-NNNNNN`, sequential within a UTC day
    pub transaction_number: String,

    pub tx_type: TransactionType,
    pub initiator_id: String,

    /// Debited account
    pub from_account_id: AccountId,

    /// Credited account
    pub to_account_id: AccountId,

    /// Always positive
    pub total_amount: Decimal,

    pub currency: Currency,
    pub description: String,
    pub status: TransactionStatus,

    /// Idempotency key supplied by the upstream caller
    pub external_reference: Option<String>,

    /// Set only on reversals, pointing at the reversed transaction
    pub related_transaction_id: Option<TransactionId>,

    /// Set when the transaction ends up FAILED
    pub failure_reason: Option<String>,

    /// When the transaction was moved to FAILED
    pub failed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Request accepted by [`crate::Ledger::execute_transaction`]
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub initiator_id: String,
    pub tx_type: TransactionType,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub external_reference: Option<String>,
}

impl TransferRequest {
    pub fn new(
        initiator_id: impl Into<String>,
        tx_type: TransactionType,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Decimal,
        currency: &str,
    ) -> Self {
        TransferRequest {
            initiator_id: initiator_id.into(),
            tx_type,
            from_account_id,
            to_account_id,
            amount,
            currency: currency.to_string(),
            description: String::new(),
            external_reference: None,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.external_reference = Some(reference.into());
        self
    }
}

/// A committed transaction together with its two entries
///
/// `entries[0]` is always the DEBIT, `entries[1]` the CREDIT.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedTransaction {
    pub transaction: FinancialTransaction,
    pub entries: [LedgerEntry; 2],
}

impl PostedTransaction {
    pub fn debit(&self) -> &LedgerEntry {
        &self.entries[0]
    }

    pub fn credit(&self) -> &LedgerEntry {
        &self.entries[1]
    }
}
