//! Error types for the ledger engine
//!
//! This module defines every error the ledger can return to a collaborator,
//! plus the narrower [`StoreError`] raised by storage backends.
//!
//! # Error Categories
//!
//! - **Validation errors**: `InvalidAccountSpec`, `InvalidAmount`,
//!   `InvalidTransfer`, `CurrencyMismatch`, `AccountNotActive`,
//!   `AccountClosed`, `InsufficientBalance`, `TransactionNotReversible`,
//!   `DuplicateReference`. Expected business outcomes, never retried.
//! - **Lookup errors**: `AccountNotFound`, `TransactionNotFound`
//! - **Contention**: `Timeout`, `ConcurrentUpdate`, retryable by the caller
//!   with backoff
//! - **Fatal**: `StorageFailure`, `CorruptLedgerState`

use super::account::AccountStatus;
use super::id::{AccountId, TransactionId};
use super::transaction::TransactionStatus;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the ledger engine
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The account request is inconsistent (owner fields, name, currency)
    #[error("Invalid account spec: {reason}")]
    InvalidAccountSpec {
        /// What was wrong with the request
        reason: String,
    },

    #[error("Account {account} not found")]
    AccountNotFound { account: AccountId },

    /// The account is FROZEN or CLOSED and cannot take new postings
    #[error("Account {account} is not active (status {status})")]
    AccountNotActive {
        account: AccountId,
        status: AccountStatus,
    },

    /// CLOSED is terminal
    #[error("Account {account} is closed")]
    AccountClosed { account: AccountId },

    /// Amounts must be strictly positive
    #[error("Invalid amount {amount}: amounts must be positive")]
    InvalidAmount { amount: Decimal },

    /// The transfer request itself is malformed (same account, missing initiator)
    #[error("Invalid transfer: {reason}")]
    InvalidTransfer { reason: String },

    /// Account and request currencies disagree; the ledger never converts
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: String, actual: String },

    /// The debit would take a protected account below zero
    #[error("Insufficient balance on account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Transaction {transaction} not found")]
    TransactionNotFound { transaction: TransactionId },

    /// Only COMPLETED transactions that are not themselves reversals can be reversed
    #[error("Transaction {transaction} cannot be reversed (status {status})")]
    TransactionNotReversible {
        transaction: TransactionId,
        status: TransactionStatus,
    },

    /// Another transaction in flight already claimed this external reference
    #[error("External reference '{reference}' is already used by transaction {existing}")]
    DuplicateReference {
        reference: String,
        existing: TransactionId,
    },

    /// A stored invariant does not hold; this should never happen
    #[error("Corrupt ledger state: {detail}")]
    CorruptLedgerState { detail: String },

    /// A per-account guard could not be acquired in time
    #[error("Timed out after {waited:?} waiting for account {account}")]
    Timeout { account: AccountId, waited: Duration },

    /// Another writer moved the account between read and commit; nothing was committed
    #[error("Account {account} was updated concurrently")]
    ConcurrentUpdate { account: AccountId },

    /// The storage layer failed; nothing was committed
    #[error("Storage failure: {message}")]
    StorageFailure { message: String },
}

impl LedgerError {
    /// Whether the caller may retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Timeout { .. } | LedgerError::ConcurrentUpdate { .. }
        )
    }

    /// Whether the error signals an infrastructure or invariant failure
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LedgerError::StorageFailure { .. } | LedgerError::CorruptLedgerState { .. }
        )
    }

    /// Create an InvalidAccountSpec error
    pub fn invalid_account_spec(reason: impl Into<String>) -> Self {
        LedgerError::InvalidAccountSpec {
            reason: reason.into(),
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account: &AccountId) -> Self {
        LedgerError::AccountNotFound {
            account: account.clone(),
        }
    }

    /// Create an AccountNotActive error
    pub fn account_not_active(account: &AccountId, status: AccountStatus) -> Self {
        LedgerError::AccountNotActive {
            account: account.clone(),
            status,
        }
    }

    /// Create an AccountClosed error
    pub fn account_closed(account: &AccountId) -> Self {
        LedgerError::AccountClosed {
            account: account.clone(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create an InvalidTransfer error
    pub fn invalid_transfer(reason: impl Into<String>) -> Self {
        LedgerError::InvalidTransfer {
            reason: reason.into(),
        }
    }

    /// Create a CurrencyMismatch error
    pub fn currency_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        LedgerError::CurrencyMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(account: &AccountId, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientBalance {
            account: account.clone(),
            balance,
            requested,
        }
    }

    /// Create a TransactionNotFound error
    pub fn transaction_not_found(transaction: &TransactionId) -> Self {
        LedgerError::TransactionNotFound {
            transaction: transaction.clone(),
        }
    }

    /// Create a TransactionNotReversible error
    pub fn transaction_not_reversible(
        transaction: &TransactionId,
        status: TransactionStatus,
    ) -> Self {
        LedgerError::TransactionNotReversible {
            transaction: transaction.clone(),
            status,
        }
    }

    /// Create a DuplicateReference error
    pub fn duplicate_reference(reference: impl Into<String>, existing: &TransactionId) -> Self {
        LedgerError::DuplicateReference {
            reference: reference.into(),
            existing: existing.clone(),
        }
    }

    /// Create a CorruptLedgerState error
    pub fn corrupt(detail: impl Into<String>) -> Self {
        LedgerError::CorruptLedgerState {
            detail: detail.into(),
        }
    }

    /// Create a Timeout error
    pub fn timeout(account: &AccountId, waited: Duration) -> Self {
        LedgerError::Timeout {
            account: account.clone(),
            waited,
        }
    }
}

/// Errors raised by a [`crate::core::traits::LedgerStore`] backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A unique index rejected the write
    #[error("Unique constraint violated on {index}: '{value}'")]
    Duplicate { index: &'static str, value: String },

    /// The external reference is held by another live transaction
    #[error("External reference '{reference}' held by transaction {existing}")]
    ReferenceTaken {
        reference: String,
        existing: TransactionId,
    },

    /// A row the write depends on does not exist
    #[error("{kind} '{id}' does not exist")]
    Missing { kind: &'static str, id: String },

    /// An account head moved since the posting was prepared
    #[error("Posting conflict on account {account}: expected head {expected:?}, found {found:?}")]
    Conflict {
        account: AccountId,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// A status change the lifecycle does not allow
    #[error("Illegal status change for transaction {transaction}: {from} -> {to}")]
    IllegalTransition {
        transaction: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Backend-specific failure (I/O, lock poisoning, connection loss)
    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LedgerError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { account, .. } => LedgerError::ConcurrentUpdate { account },
            other => LedgerError::StorageFailure {
                message: other.to_string(),
            },
        }
    }
}
