//! Core ledger components
//!
//! This module contains the engine behind [`Ledger`]:
//! - `traits` - Storage and audit abstractions
//! - `memory_store` - In-memory storage backend
//! - `numbering` - Account and transaction numbers
//! - `balance` - Sign conventions and balance derivation
//! - `guard` - Per-account mutual exclusion
//! - `account_registry` - Account creation and lifecycle
//! - `processor` - Transfer execution
//! - `reversal` - Offsetting transactions
//! - `verify` - Reconciliation of the entry log
//! - `ledger` - The facade wiring everything together

pub mod account_registry;
pub mod balance;
pub mod guard;
pub mod ledger;
pub mod memory_store;
pub mod numbering;
pub mod processor;
pub mod reversal;
#[cfg(test)]
pub(crate) mod test_support;
pub mod traits;
pub mod verify;

pub use account_registry::AccountRegistry;
pub use balance::{BalanceCalculator, SignConvention};
pub use guard::AccountGuards;
pub use ledger::Ledger;
pub use memory_store::InMemoryStore;
pub use numbering::NumberingService;
pub use processor::TransactionProcessor;
pub use reversal::ReversalHandler;
pub use traits::{AuditSink, LedgerStore, Posting, StatusAudit, StatusChange, TracingAuditSink};
pub use verify::{Discrepancy, LedgerVerifier, VerificationReport};
