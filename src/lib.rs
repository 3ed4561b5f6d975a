//! Double-Entry Ledger Engine Library
//! # Overview
//!
//! This library records money movements between accounts as balanced pairs
//! of DEBIT and CREDIT entries over an append-only log.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, FinancialTransaction, LedgerEntry, etc.)
//! - [`config`] - Engine configuration
//! - [`core`] - Business logic components:
//!   - [`core::account_registry`] - Account creation, lookup and lifecycle
//!   - [`core::processor`] - Transfer validation and atomic posting
//!   - [`core::reversal`] - Offsetting transactions
//!   - [`core::balance`] - Sign conventions and balance derivation
//!   - [`core::verify`] - Reconciliation of the entry log
//!   - [`core::ledger`] - The [`Ledger`] facade
//! - [`io`] - CSV journal replay and balance output
//! - [`cli`] - CLI arguments parsing
//! - [`telemetry`] - Logging setup
//!
//! # Transaction Types
//!
//! DEPOSIT, WITHDRAWAL, TRANSFER, PAYMENT, FEE, REFUND and ADJUSTMENT all
//! post one DEBIT on the source account and one CREDIT on the destination.
//! REFUND is what a reversal creates; ADJUSTMENT may overdraw protected
//! accounts.
//!
//! # Invariants
//!
//! - Every committed transaction has exactly two entries of equal amount
//! - An account's balance always equals the one derived from its entries
//! - Entries are never updated or deleted; corrections are new postings
//! - An external reference maps to at most one transaction

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod telemetry;
pub mod types;

pub use crate::config::LedgerConfig;
pub use crate::core::{Ledger, LedgerStore, SignConvention, VerificationReport};
pub use io::{JournalReplay, ReplaySummary};
pub use types::{
    Account, AccountId, AccountStatus, AccountType, FinancialTransaction, LedgerEntry,
    LedgerError, NewAccount, PostedTransaction, TransactionId, TransactionType, TransferRequest,
};
