//! Transaction processing
//!
//! This module provides the [`TransactionProcessor`], the state machine that
//! turns a [`TransferRequest`] into one COMPLETED transaction and exactly two
//! ledger entries, or into nothing at all.
//!
//! # Flow
//!
//! ```text
//! validate request ──► load accounts ──► idempotent replay?
//!                                              │
//!                      acquire guards (sorted) ◄┘
//!                              │
//!        re-check status, currency, reference under the guards
//!                              │
//!           read balances ──► overdraft check ──► PROCESSING row
//!                              │
//!                 commit Posting (entries + COMPLETED)
//!                              │
//!                       release guards
//! ```
//!
//! Once the guards are held nothing awaits until they drop, so a posting can
//! never be abandoned half-way by a cancelled future. If the commit fails the
//! PROCESSING row is moved to FAILED before the error is returned.

use crate::config::LedgerConfig;
use crate::core::balance::BalanceCalculator;
use crate::core::guard::AccountGuards;
use crate::core::numbering::NumberingService;
use crate::core::traits::{LedgerStore, Posting, StatusChange};
use crate::types::{
    Account, AccountId, Currency, EntryId, EntryType, FinancialTransaction, LedgerEntry,
    LedgerError, PostedTransaction, StoreError, TransactionId, TransactionStatus,
    TransferRequest,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Executes transfers between two accounts
pub struct TransactionProcessor {
    store: Arc<dyn LedgerStore>,
    numbering: NumberingService,
    guards: Arc<AccountGuards>,
    calculator: Arc<BalanceCalculator>,
    config: Arc<LedgerConfig>,
}

/// Outcome of claiming the request's external reference
enum Claim {
    Fresh,
    Replay(PostedTransaction),

    /// Held by a transaction that is still PROCESSING
    InFlight(TransactionId),
}

impl TransactionProcessor {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        numbering: NumberingService,
        guards: Arc<AccountGuards>,
        calculator: Arc<BalanceCalculator>,
        config: Arc<LedgerConfig>,
    ) -> Self {
        Self {
            store,
            numbering,
            guards,
            calculator,
            config,
        }
    }

    /// Execute a transfer, or replay the earlier result for a known reference
    #[tracing::instrument(
        name = "execute_transaction",
        skip(self, request),
        fields(
            tx_type = %request.tx_type,
            from = %request.from_account_id,
            to = %request.to_account_id,
            amount = %request.amount,
            reference = request.external_reference.as_deref().unwrap_or(""),
        )
    )]
    pub async fn execute(&self, request: TransferRequest) -> Result<PostedTransaction, LedgerError> {
        let result = self.process(request).await;
        match &result {
            Ok(posted) => tracing::info!(
                transaction_id = %posted.transaction.id,
                transaction_number = %posted.transaction.transaction_number,
                "transaction completed"
            ),
            Err(e) if e.is_fatal() => tracing::error!("transaction failed: {}", e),
            Err(e) => tracing::debug!("transaction rejected: {}", e),
        }
        result
    }

    async fn process(&self, request: TransferRequest) -> Result<PostedTransaction, LedgerError> {
        Self::validate_request(&request)?;

        // Fast path before taking any guard
        let from = self.load_active(&request.from_account_id)?;
        let to = self.load_active(&request.to_account_id)?;
        let currency = Self::check_currency(&from, &to, &request.currency)?;
        // An in-flight holder may finish while we wait for the guards
        if let Claim::Replay(posted) = self.check_reference(&request)? {
            return Ok(posted);
        }

        let _guards = self
            .guards
            .acquire(&[&request.from_account_id, &request.to_account_id])
            .await?;

        // Everything below runs to completion without yielding
        let from = self.load_active(&request.from_account_id)?;
        let to = self.load_active(&request.to_account_id)?;
        Self::check_currency(&from, &to, currency.as_str())?;
        match self.check_reference(&request)? {
            Claim::Fresh => {}
            Claim::Replay(posted) => return Ok(posted),
            Claim::InFlight(existing) => {
                let reference = request.external_reference.as_deref().unwrap_or_default();
                return Err(LedgerError::duplicate_reference(reference, &existing));
            }
        }

        let convention = self.calculator.convention();
        let from_balance = self.calculator.current(&from.id)?;
        let to_balance = self.calculator.current(&to.id)?;

        let debit_after = convention.apply(
            from.account_type,
            from_balance.balance,
            EntryType::Debit,
            request.amount,
        )?;
        let credit_after = convention.apply(
            to.account_type,
            to_balance.balance,
            EntryType::Credit,
            request.amount,
        )?;

        if self.config.is_overdraft_protected(from.account_type)
            && !self.config.is_overdraft_exempt(request.tx_type)
            && debit_after < from_balance.balance
            && debit_after < Decimal::ZERO
        {
            return Err(LedgerError::insufficient_balance(
                &from.id,
                from_balance.balance,
                request.amount,
            ));
        }

        let now = Utc::now();
        let transaction = FinancialTransaction {
            id: TransactionId::generate(),
            transaction_number: self.numbering.next_transaction_number()?,
            tx_type: request.tx_type,
            initiator_id: request.initiator_id.trim().to_string(),
            from_account_id: from.id.clone(),
            to_account_id: to.id.clone(),
            total_amount: request.amount,
            currency,
            description: request.description.clone(),
            status: TransactionStatus::Processing,
            external_reference: request.external_reference.clone(),
            related_transaction_id: None,
            failure_reason: None,
            failed_at: None,
            created_at: now,
            completed_at: None,
        };

        match self.store.insert_transaction(transaction.clone()) {
            Ok(()) => {}
            Err(StoreError::ReferenceTaken {
                reference,
                existing,
            }) => {
                // Claimed by a request on another account pair since the re-check
                return match self.replay(&existing)? {
                    Some(posted) => Ok(posted),
                    None => Err(LedgerError::duplicate_reference(reference, &existing)),
                };
            }
            Err(e) => return Err(e.into()),
        }

        let debit = LedgerEntry {
            id: EntryId::generate(),
            account_id: from.id.clone(),
            transaction_id: transaction.id.clone(),
            entry_type: EntryType::Debit,
            amount: request.amount,
            balance_after: debit_after,
            description: request.description.clone(),
            reference_number: transaction.transaction_number.clone(),
            is_reversed: false,
            original_entry_id: None,
            sequence: 0,
            posted_at: now,
        };
        let credit = LedgerEntry {
            id: EntryId::generate(),
            account_id: to.id.clone(),
            entry_type: EntryType::Credit,
            balance_after: credit_after,
            ..debit.clone()
        };

        let completed_at = Utc::now();
        let posting = Posting {
            entries: vec![debit, credit],
            expected_heads: vec![
                (from.id.clone(), from_balance.head),
                (to.id.clone(), to_balance.head),
            ],
            reversed_entries: Vec::new(),
            status_changes: vec![StatusChange {
                transaction_id: transaction.id.clone(),
                status: TransactionStatus::Completed,
                at: completed_at,
            }],
        };

        let stored = commit_or_fail(self.store.as_ref(), &transaction.id, posting)?;
        self.calculator.observe(&stored);

        let transaction = FinancialTransaction {
            status: TransactionStatus::Completed,
            completed_at: Some(completed_at),
            ..transaction
        };
        into_posted(transaction, stored)
    }

    fn validate_request(request: &TransferRequest) -> Result<(), LedgerError> {
        if request.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(request.amount));
        }
        if request.initiator_id.trim().is_empty() {
            return Err(LedgerError::invalid_transfer("initiator_id must not be empty"));
        }
        if request.from_account_id == request.to_account_id {
            return Err(LedgerError::invalid_transfer(
                "source and destination accounts must differ",
            ));
        }
        Ok(())
    }

    fn load_active(&self, id: &AccountId) -> Result<Account, LedgerError> {
        let account = self
            .store
            .get_account(id)?
            .ok_or_else(|| LedgerError::account_not_found(id))?;
        if !account.is_active() {
            return Err(LedgerError::account_not_active(id, account.status));
        }
        Ok(account)
    }

    fn check_currency(from: &Account, to: &Account, requested: &str) -> Result<Currency, LedgerError> {
        if from.currency != to.currency {
            return Err(LedgerError::currency_mismatch(
                from.currency.as_str(),
                to.currency.as_str(),
            ));
        }
        match Currency::parse(requested) {
            Some(currency) if currency == from.currency => Ok(currency),
            _ => Err(LedgerError::currency_mismatch(
                from.currency.as_str(),
                requested.trim().to_ascii_uppercase(),
            )),
        }
    }

    fn check_reference(&self, request: &TransferRequest) -> Result<Claim, LedgerError> {
        let Some(reference) = request.external_reference.as_deref() else {
            return Ok(Claim::Fresh);
        };
        let Some(existing) = self.store.find_by_reference(reference)? else {
            return Ok(Claim::Fresh);
        };
        match self.replay(&existing.id)? {
            Some(posted) => {
                tracing::debug!(
                    transaction_id = %posted.transaction.id,
                    "replaying transaction for known reference"
                );
                Ok(Claim::Replay(posted))
            }
            None => Ok(Claim::InFlight(existing.id)),
        }
    }

    /// The posted result of a finished transaction, `None` while it is in flight
    fn replay(&self, id: &TransactionId) -> Result<Option<PostedTransaction>, LedgerError> {
        let Some(transaction) = self.store.get_transaction(id)? else {
            return Ok(None);
        };
        match transaction.status {
            TransactionStatus::Completed | TransactionStatus::Reversed => {
                let entries = self.store.transaction_entries(id)?;
                into_posted(transaction, entries).map(Some)
            }
            TransactionStatus::Processing | TransactionStatus::Failed => Ok(None),
        }
    }

    pub fn get_transaction(&self, id: &TransactionId) -> Result<FinancialTransaction, LedgerError> {
        self.store
            .get_transaction(id)?
            .ok_or_else(|| LedgerError::transaction_not_found(id))
    }

    pub fn transaction_entries(&self, id: &TransactionId) -> Result<Vec<LedgerEntry>, LedgerError> {
        self.get_transaction(id)?;
        Ok(self.store.transaction_entries(id)?)
    }
}

impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("calculator", &self.calculator)
            .finish_non_exhaustive()
    }
}

/// Commit a posting, marking `transaction` FAILED if the store rejects it
pub(crate) fn commit_or_fail(
    store: &dyn LedgerStore,
    transaction: &TransactionId,
    posting: Posting,
) -> Result<Vec<LedgerEntry>, LedgerError> {
    match store.commit_posting(posting) {
        Ok(stored) => Ok(stored),
        Err(e) => {
            if matches!(e, StoreError::Conflict { .. }) {
                tracing::warn!(transaction_id = %transaction, "posting lost a head race: {}", e);
            } else {
                tracing::error!(transaction_id = %transaction, "posting commit failed: {}", e);
            }
            if let Err(rollback) = store.fail_transaction(transaction, &e.to_string(), Utc::now()) {
                tracing::error!(
                    transaction_id = %transaction,
                    "could not mark transaction FAILED: {}",
                    rollback
                );
            }
            Err(e.into())
        }
    }
}

/// Pair a transaction with its entries, DEBIT first
pub(crate) fn into_posted(
    transaction: FinancialTransaction,
    entries: Vec<LedgerEntry>,
) -> Result<PostedTransaction, LedgerError> {
    let count = entries.len();
    let mut debits = entries
        .iter()
        .filter(|entry| entry.entry_type == EntryType::Debit);
    let mut credits = entries
        .iter()
        .filter(|entry| entry.entry_type == EntryType::Credit);

    match (debits.next(), credits.next(), count) {
        (Some(debit), Some(credit), 2) => Ok(PostedTransaction {
            entries: [debit.clone(), credit.clone()],
            transaction,
        }),
        _ => {
            let error = LedgerError::corrupt(format!(
                "transaction {} has {} entries, expected one DEBIT and one CREDIT",
                transaction.id, count
            ));
            tracing::error!("{}", error);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::account_registry::AccountRegistry;
    use crate::core::balance::SignConvention;
    use crate::core::memory_store::InMemoryStore;
    use crate::core::test_support::FailingCommitStore;
    use crate::core::traits::TracingAuditSink;
    use crate::types::{AccountStatus, AccountType, NewAccount, OwnerType, TransactionType};
    use rstest::rstest;
    use std::time::Duration;

    struct Fixture {
        registry: AccountRegistry,
        guards: Arc<AccountGuards>,
        processor: TransactionProcessor,
        calculator: Arc<BalanceCalculator>,
        store: Arc<dyn LedgerStore>,
        float: Account,
        alice: Account,
        bob: Account,
    }

    fn fixture_with(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Fixture {
        let numbering = NumberingService::new(Arc::clone(&store));
        let guards = Arc::new(AccountGuards::new(config.guard_timeout));
        let calculator = Arc::new(BalanceCalculator::new(
            Arc::clone(&store),
            config.sign_convention,
            config.cache_balances,
        ));
        let registry = AccountRegistry::new(
            Arc::clone(&store),
            numbering.clone(),
            Arc::clone(&guards),
            Arc::new(TracingAuditSink),
            config.account_number_attempts,
        );
        let processor = TransactionProcessor::new(
            Arc::clone(&store),
            numbering,
            Arc::clone(&guards),
            Arc::clone(&calculator),
            Arc::new(config),
        );

        let float = registry
            .create_account(NewAccount::system("Float", AccountType::Liability, "HTG"))
            .unwrap();
        let alice = registry
            .create_account(
                NewAccount::new("Alice", AccountType::Asset, "HTG")
                    .owned_by("alice", OwnerType::User),
            )
            .unwrap();
        let bob = registry
            .create_account(
                NewAccount::new("Bob", AccountType::Asset, "HTG").owned_by("bob", OwnerType::User),
            )
            .unwrap();

        Fixture {
            registry,
            guards,
            processor,
            calculator,
            store,
            float,
            alice,
            bob,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryStore::new()), LedgerConfig::default())
    }

    fn htg(units: i64) -> Decimal {
        Decimal::new(units * 100, 2)
    }

    fn request(tx_type: TransactionType, from: &Account, to: &Account, amount: Decimal) -> TransferRequest {
        TransferRequest::new("tester", tx_type, from.id.clone(), to.id.clone(), amount, "HTG")
    }

    #[tokio::test]
    async fn test_deposit_then_transfer() {
        let f = fixture();

        let deposit = f
            .processor
            .execute(request(TransactionType::Deposit, &f.float, &f.alice, htg(500)))
            .await
            .unwrap();
        assert_eq!(deposit.transaction.status, TransactionStatus::Completed);
        assert!(deposit.transaction.completed_at.is_some());
        assert_eq!(deposit.credit().balance_after, htg(500));
        assert_eq!(deposit.debit().balance_after, htg(-500));

        let transfer = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &f.bob, htg(200)).described("rent"))
            .await
            .unwrap();

        assert_eq!(transfer.debit().account_id, f.alice.id);
        assert_eq!(transfer.debit().balance_after, htg(300));
        assert_eq!(transfer.credit().account_id, f.bob.id);
        assert_eq!(transfer.credit().balance_after, htg(200));
        assert_eq!(transfer.debit().reference_number, transfer.transaction.transaction_number);
        assert_eq!(transfer.credit().description, "rent");
        assert!(transfer.debit().sequence < transfer.credit().sequence);

        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), htg(300));
        assert_eq!(f.calculator.balance(&f.bob.id).unwrap(), htg(200));

        let stored = f.processor.get_transaction(&transfer.transaction.id).unwrap();
        assert_eq!(stored, transfer.transaction);
    }

    #[rstest]
    #[case::zero(Decimal::ZERO)]
    #[case::negative(Decimal::new(-100, 2))]
    #[tokio::test]
    async fn test_non_positive_amount_rejected(#[case] amount: Decimal) {
        let f = fixture();
        let result = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &f.bob, amount))
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[tokio::test]
    async fn test_self_transfer_and_missing_initiator_rejected() {
        let f = fixture();

        let result = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &f.alice, htg(1)))
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidTransfer { .. })));

        let mut anonymous = request(TransactionType::Transfer, &f.alice, &f.bob, htg(1));
        anonymous.initiator_id = " ".to_string();
        let result = f.processor.execute(anonymous).await;
        assert!(matches!(result, Err(LedgerError::InvalidTransfer { .. })));
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_accounts_rejected() {
        let f = fixture();
        let ghost = AccountId::from("ghost");

        let result = f
            .processor
            .execute(TransferRequest::new(
                "tester",
                TransactionType::Transfer,
                f.alice.id.clone(),
                ghost,
                htg(1),
                "HTG",
            ))
            .await;
        assert!(matches!(result, Err(LedgerError::AccountNotFound { .. })));

        f.registry
            .set_status(&f.bob.id, AccountStatus::Frozen, "compliance")
            .await
            .unwrap();
        let result = f
            .processor
            .execute(request(TransactionType::Deposit, &f.float, &f.bob, htg(1)))
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::AccountNotActive {
                status: AccountStatus::Frozen,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_currency_mismatch() {
        let f = fixture();
        let usd = f
            .registry
            .create_account(
                NewAccount::new("USD", AccountType::Asset, "USD").owned_by("bob", OwnerType::User),
            )
            .unwrap();

        let result = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &usd, htg(1)))
            .await;
        assert!(matches!(result, Err(LedgerError::CurrencyMismatch { .. })));

        let mut wrong_code = request(TransactionType::Transfer, &f.alice, &f.bob, htg(1));
        wrong_code.currency = "usd".to_string();
        let result = f.processor.execute(wrong_code).await;
        assert_eq!(
            result.unwrap_err(),
            LedgerError::currency_mismatch("HTG", "USD")
        );
    }

    #[tokio::test]
    async fn test_insufficient_balance_leaves_no_trace() {
        let f = fixture();
        f.processor
            .execute(request(TransactionType::Deposit, &f.float, &f.alice, htg(50)))
            .await
            .unwrap();

        let result = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &f.bob, htg(100)))
            .await;

        assert_eq!(
            result.unwrap_err(),
            LedgerError::insufficient_balance(&f.alice.id, htg(50), htg(100))
        );
        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), htg(50));
        assert_eq!(f.store.all_transactions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_adjustment_may_overdraw() {
        let f = fixture();

        let posted = f
            .processor
            .execute(request(TransactionType::Adjustment, &f.alice, &f.bob, htg(10)))
            .await
            .unwrap();

        assert_eq!(posted.debit().balance_after, htg(-10));
    }

    #[rstest]
    #[case::defaults(LedgerConfig::default(), TransactionType::Transfer, true)]
    #[case::adjustment_exempt(LedgerConfig::default(), TransactionType::Adjustment, true)]
    #[case::liability_protected(
        LedgerConfig::default().with_overdraft_protected(vec![AccountType::Liability]),
        TransactionType::Deposit,
        false
    )]
    #[case::adjustment_not_exempt(
        LedgerConfig::default()
            .with_overdraft_protected(vec![AccountType::Liability])
            .with_overdraft_exempt(vec![]),
        TransactionType::Adjustment,
        false
    )]
    #[tokio::test]
    async fn test_overdraft_rules_follow_config(
        #[case] config: LedgerConfig,
        #[case] tx_type: TransactionType,
        #[case] float_may_overdraw: bool,
    ) {
        let f = fixture_with(Arc::new(InMemoryStore::new()), config);

        let result = f
            .processor
            .execute(request(tx_type, &f.float, &f.alice, htg(25)))
            .await;

        if float_may_overdraw {
            assert_eq!(result.unwrap().debit().balance_after, htg(-25));
        } else {
            assert_eq!(
                result.unwrap_err(),
                LedgerError::insufficient_balance(&f.float.id, Decimal::ZERO, htg(25))
            );
            assert!(f.store.all_transactions().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_unprotected_asset_may_overdraw() {
        let config = LedgerConfig::default().with_overdraft_protected(vec![]);
        let f = fixture_with(Arc::new(InMemoryStore::new()), config);

        let posted = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &f.bob, htg(5)))
            .await
            .unwrap();

        assert_eq!(posted.debit().balance_after, htg(-5));
    }

    #[tokio::test]
    async fn test_standard_convention_balances() {
        let config = LedgerConfig::new(Duration::from_secs(1), SignConvention::Standard);
        let f = fixture_with(Arc::new(InMemoryStore::new()), config);

        let posted = f
            .processor
            .execute(request(TransactionType::Deposit, &f.float, &f.alice, htg(40)))
            .await
            .unwrap();

        // LIABILITY debited goes down, ASSET credited goes down
        assert_eq!(posted.debit().balance_after, htg(-40));
        assert_eq!(posted.credit().balance_after, htg(-40));
    }

    #[tokio::test]
    async fn test_reference_replay_returns_original() {
        let f = fixture();
        f.processor
            .execute(request(TransactionType::Deposit, &f.float, &f.alice, htg(100)))
            .await
            .unwrap();

        let first = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &f.bob, htg(30)).with_reference("order-1"))
            .await
            .unwrap();
        let second = f
            .processor
            .execute(request(TransactionType::Transfer, &f.alice, &f.bob, htg(30)).with_reference("order-1"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), htg(70));
        assert_eq!(f.store.all_transactions().unwrap().len(), 2);
    }

    /// PROCESSING row for a deposit of `amount` into alice, claimed under `reference`
    fn in_flight_deposit(f: &Fixture, reference: &str, amount: Decimal) -> FinancialTransaction {
        let transaction = FinancialTransaction {
            id: TransactionId::generate(),
            transaction_number: "TXN-20260101-000001".to_string(),
            tx_type: TransactionType::Deposit,
            initiator_id: "tester".to_string(),
            from_account_id: f.float.id.clone(),
            to_account_id: f.alice.id.clone(),
            total_amount: amount,
            currency: f.alice.currency.clone(),
            description: String::new(),
            status: TransactionStatus::Processing,
            external_reference: Some(reference.to_string()),
            related_transaction_id: None,
            failure_reason: None,
            failed_at: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        f.store.insert_transaction(transaction.clone()).unwrap();
        transaction
    }

    fn complete(f: &Fixture, transaction: &FinancialTransaction) {
        let debit = LedgerEntry {
            id: EntryId::generate(),
            account_id: transaction.from_account_id.clone(),
            transaction_id: transaction.id.clone(),
            entry_type: EntryType::Debit,
            amount: transaction.total_amount,
            balance_after: -transaction.total_amount,
            description: String::new(),
            reference_number: transaction.transaction_number.clone(),
            is_reversed: false,
            original_entry_id: None,
            sequence: 0,
            posted_at: Utc::now(),
        };
        let credit = LedgerEntry {
            id: EntryId::generate(),
            account_id: transaction.to_account_id.clone(),
            entry_type: EntryType::Credit,
            balance_after: transaction.total_amount,
            ..debit.clone()
        };
        f.store
            .commit_posting(Posting {
                entries: vec![debit, credit],
                expected_heads: Vec::new(),
                reversed_entries: Vec::new(),
                status_changes: vec![StatusChange {
                    transaction_id: transaction.id.clone(),
                    status: TransactionStatus::Completed,
                    at: Utc::now(),
                }],
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_retry_waits_for_in_flight_attempt_and_replays_it() {
        let f = fixture();
        let held = f.guards.acquire(&[&f.float.id, &f.alice.id]).await.unwrap();
        let first = in_flight_deposit(&f, "dep-9", htg(30));

        let retry = f.processor.execute(
            request(TransactionType::Deposit, &f.float, &f.alice, htg(30)).with_reference("dep-9"),
        );
        let finish_first = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            complete(&f, &first);
            drop(held);
        };
        let (replayed, ()) = tokio::join!(retry, finish_first);

        let replayed = replayed.unwrap();
        assert_eq!(replayed.transaction.id, first.id);
        assert_eq!(replayed.transaction.status, TransactionStatus::Completed);
        assert_eq!(f.store.all_transactions().unwrap().len(), 1);
        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), htg(30));
    }

    #[tokio::test]
    async fn test_reference_still_in_flight_under_guards_is_duplicate() {
        let f = fixture();
        let first = in_flight_deposit(&f, "dep-9", htg(30));

        let result = f
            .processor
            .execute(request(TransactionType::Deposit, &f.float, &f.alice, htg(30)).with_reference("dep-9"))
            .await;

        assert_eq!(
            result.unwrap_err(),
            LedgerError::duplicate_reference("dep-9", &first.id)
        );
    }

    #[tokio::test]
    async fn test_commit_failure_marks_transaction_failed() {
        let f = fixture_with(Arc::new(FailingCommitStore::default()), LedgerConfig::default());

        let result = f
            .processor
            .execute(request(TransactionType::Adjustment, &f.float, &f.alice, htg(5)).with_reference("adj-1"))
            .await;

        assert!(matches!(result, Err(LedgerError::StorageFailure { .. })));
        let transactions = f.store.all_transactions().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Failed);
        assert!(transactions[0].failure_reason.as_deref().unwrap().contains("disk full"));
        assert!(transactions[0].failed_at.is_some());
        assert!(f.store.transaction_entries(&transactions[0].id).unwrap().is_empty());
        // The failed attempt released its reference
        assert!(f.store.find_by_reference("adj-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_lookups() {
        let f = fixture();
        let posted = f
            .processor
            .execute(request(TransactionType::Deposit, &f.float, &f.alice, htg(5)))
            .await
            .unwrap();

        let entries = f.processor.transaction_entries(&posted.transaction.id).unwrap();
        assert_eq!(entries.len(), 2);

        let missing = TransactionId::from("missing");
        assert!(matches!(
            f.processor.get_transaction(&missing),
            Err(LedgerError::TransactionNotFound { .. })
        ));
        assert!(matches!(
            f.processor.transaction_entries(&missing),
            Err(LedgerError::TransactionNotFound { .. })
        ));
    }
}
