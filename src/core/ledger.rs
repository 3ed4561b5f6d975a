//! The ledger facade
//!
//! [`Ledger`] wires the registry, calculator, processor, reversal handler and
//! verifier around one injected [`LedgerStore`] and exposes the narrow API
//! collaborators call. It is cheap to clone and safe to share across tasks.
//!
//! # Architecture
//!
//! ```text
//! Ledger
//!     ├── Arc<AccountRegistry>       (accounts, status lifecycle, audit)
//!     ├── Arc<BalanceCalculator>     (balances and cache)
//!     ├── Arc<TransactionProcessor>  (transfers)
//!     ├── Arc<ReversalHandler>       (refunds)
//!     └── Arc<dyn LedgerStore>       (shared by all of the above)
//! ```

use crate::config::LedgerConfig;
use crate::core::account_registry::AccountRegistry;
use crate::core::balance::BalanceCalculator;
use crate::core::guard::AccountGuards;
use crate::core::memory_store::InMemoryStore;
use crate::core::numbering::NumberingService;
use crate::core::processor::TransactionProcessor;
use crate::core::reversal::ReversalHandler;
use crate::core::traits::{AuditSink, LedgerStore, TracingAuditSink};
use crate::core::verify::{LedgerVerifier, VerificationReport};
use crate::types::{
    Account, AccountFilter, AccountId, AccountStatus, EntryPage, FinancialTransaction,
    LedgerEntry, LedgerError, NewAccount, Pagination, PostedTransaction, TransactionId,
    TransferRequest,
};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Double-entry ledger over an injected store
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    config: Arc<LedgerConfig>,
    registry: Arc<AccountRegistry>,
    calculator: Arc<BalanceCalculator>,
    processor: Arc<TransactionProcessor>,
    reversals: Arc<ReversalHandler>,
}

impl Ledger {
    /// Create a ledger over `store` that audits through `tracing`
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self::with_audit_sink(store, config, Arc::new(TracingAuditSink))
    }

    /// Create a ledger backed by a fresh [`InMemoryStore`]
    pub fn in_memory(config: LedgerConfig) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), config)
    }

    pub fn with_audit_sink(
        store: Arc<dyn LedgerStore>,
        config: LedgerConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let config = Arc::new(config);
        let numbering = NumberingService::new(Arc::clone(&store));
        let guards = Arc::new(AccountGuards::new(config.guard_timeout));
        let calculator = Arc::new(BalanceCalculator::new(
            Arc::clone(&store),
            config.sign_convention,
            config.cache_balances,
        ));

        let registry = Arc::new(AccountRegistry::new(
            Arc::clone(&store),
            numbering.clone(),
            Arc::clone(&guards),
            audit,
            config.account_number_attempts,
        ));
        let processor = Arc::new(TransactionProcessor::new(
            Arc::clone(&store),
            numbering.clone(),
            Arc::clone(&guards),
            Arc::clone(&calculator),
            Arc::clone(&config),
        ));
        let reversals = Arc::new(ReversalHandler::new(
            Arc::clone(&store),
            numbering,
            guards,
            Arc::clone(&calculator),
        ));

        Self {
            store,
            config,
            registry,
            calculator,
            processor,
            reversals,
        }
    }

    pub fn create_account(&self, request: NewAccount) -> Result<Account, LedgerError> {
        self.registry.create_account(request)
    }

    pub fn get_account(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.registry.get_account(id)
    }

    pub fn list_accounts_by_owner(
        &self,
        owner_id: &str,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LedgerError> {
        self.registry.list_by_owner(owner_id, filter)
    }

    pub async fn set_account_status(
        &self,
        id: &AccountId,
        status: AccountStatus,
        actor_id: &str,
    ) -> Result<Account, LedgerError> {
        self.registry.set_status(id, status, actor_id).await
    }

    /// Current balance of an account
    pub fn get_balance(&self, id: &AccountId) -> Result<Decimal, LedgerError> {
        self.registry.get_account(id)?;
        self.calculator.balance(id)
    }

    /// Balance recomputed from the full entry history
    pub fn derive_balance(&self, id: &AccountId) -> Result<Decimal, LedgerError> {
        let account = self.registry.get_account(id)?;
        self.calculator.derive(id, account.account_type)
    }

    pub async fn execute_transaction(
        &self,
        request: TransferRequest,
    ) -> Result<PostedTransaction, LedgerError> {
        self.processor.execute(request).await
    }

    /// Reverse a COMPLETED transaction on behalf of `actor_id`
    pub async fn reverse_transaction(
        &self,
        id: &TransactionId,
        actor_id: &str,
        reason: &str,
    ) -> Result<FinancialTransaction, LedgerError> {
        self.reversals.reverse(id, actor_id, reason).await
    }

    pub fn get_transaction(&self, id: &TransactionId) -> Result<FinancialTransaction, LedgerError> {
        self.processor.get_transaction(id)
    }

    pub fn get_transaction_entries(
        &self,
        id: &TransactionId,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.processor.transaction_entries(id)
    }

    /// One page of an account's statement, oldest first
    pub fn get_account_entries(
        &self,
        id: &AccountId,
        page: Pagination,
    ) -> Result<EntryPage, LedgerError> {
        self.registry.get_account(id)?;

        let limit = self.config.page_limit(page.limit);
        let (entries, total) = self.store.account_entries(id, page.offset, limit)?;
        let end = page.offset.saturating_add(entries.len());
        let next_offset = (end < total).then_some(end);

        Ok(EntryPage {
            entries,
            total,
            next_offset,
        })
    }

    /// Reconcile every account and transaction
    pub fn verify_ledger(&self) -> Result<VerificationReport, LedgerError> {
        LedgerVerifier::new(Arc::clone(&self.store), self.config.sign_convention).run()
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .field("calculator", &self.calculator)
            .finish_non_exhaustive()
    }
}
