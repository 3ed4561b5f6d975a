//! Transaction reversal
//!
//! A reversal never deletes history. It posts a REFUND transaction whose two
//! entries offset the original pair on the same accounts, flags the original
//! entries `is_reversed`, and moves the original to REVERSED, all in one
//! store commit under the guards of both accounts.

use crate::core::balance::BalanceCalculator;
use crate::core::guard::AccountGuards;
use crate::core::numbering::NumberingService;
use crate::core::processor::commit_or_fail;
use crate::core::traits::{LedgerStore, Posting, StatusChange};
use crate::types::{
    Account, AccountId, AccountStatus, EntryId, EntryType, FinancialTransaction, LedgerEntry,
    LedgerError, TransactionId, TransactionStatus, TransactionType,
};
use chrono::Utc;
use std::sync::Arc;

/// Posts offsetting transactions for completed ones
pub struct ReversalHandler {
    store: Arc<dyn LedgerStore>,
    numbering: NumberingService,
    guards: Arc<AccountGuards>,
    calculator: Arc<BalanceCalculator>,
}

impl ReversalHandler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        numbering: NumberingService,
        guards: Arc<AccountGuards>,
        calculator: Arc<BalanceCalculator>,
    ) -> Self {
        Self {
            store,
            numbering,
            guards,
            calculator,
        }
    }

    /// Reverse a COMPLETED transaction, returning the new REFUND transaction
    #[tracing::instrument(
        name = "reverse_transaction",
        skip(self, actor_id, reason),
        fields(actor = %actor_id)
    )]
    pub async fn reverse(
        &self,
        transaction_id: &TransactionId,
        actor_id: &str,
        reason: &str,
    ) -> Result<FinancialTransaction, LedgerError> {
        let result = self.process(transaction_id, actor_id, reason).await;
        match &result {
            Ok(reversal) => tracing::info!(
                reversal_id = %reversal.id,
                transaction_number = %reversal.transaction_number,
                "transaction reversed"
            ),
            Err(e) if e.is_fatal() => tracing::error!("reversal failed: {}", e),
            Err(e) => tracing::debug!("reversal rejected: {}", e),
        }
        result
    }

    async fn process(
        &self,
        transaction_id: &TransactionId,
        actor_id: &str,
        reason: &str,
    ) -> Result<FinancialTransaction, LedgerError> {
        if actor_id.trim().is_empty() {
            return Err(LedgerError::invalid_transfer("reversal requires an actor id"));
        }

        let original = self.load_reversible(transaction_id)?;
        let originals = self.load_entries(&original)?;
        for entry in &originals {
            self.load_open(&entry.account_id)?;
        }

        let _guards = self
            .guards
            .acquire(&[&originals[0].account_id, &originals[1].account_id])
            .await?;

        // A concurrent reversal may have won the race for the guards
        let original = self.load_reversible(transaction_id)?;
        let originals = self.load_entries(&original)?;

        let now = Utc::now();
        let reversal = FinancialTransaction {
            id: TransactionId::generate(),
            transaction_number: self.numbering.next_transaction_number()?,
            tx_type: TransactionType::Refund,
            initiator_id: actor_id.trim().to_string(),
            from_account_id: original.to_account_id.clone(),
            to_account_id: original.from_account_id.clone(),
            total_amount: original.total_amount,
            currency: original.currency.clone(),
            description: reason.to_string(),
            status: TransactionStatus::Processing,
            external_reference: None,
            related_transaction_id: Some(original.id.clone()),
            failure_reason: None,
            failed_at: None,
            created_at: now,
            completed_at: None,
        };

        let mut entries = Vec::with_capacity(2);
        let mut expected_heads = Vec::with_capacity(2);
        for entry in &originals {
            let account = self.load_open(&entry.account_id)?;
            let current = self.calculator.current(&account.id)?;
            let entry_type = entry.entry_type.flipped();
            let balance_after = self.calculator.convention().apply(
                account.account_type,
                current.balance,
                entry_type,
                entry.amount,
            )?;

            expected_heads.push((account.id.clone(), current.head));
            entries.push(LedgerEntry {
                id: EntryId::generate(),
                account_id: account.id,
                transaction_id: reversal.id.clone(),
                entry_type,
                amount: entry.amount,
                balance_after,
                description: reason.to_string(),
                reference_number: reversal.transaction_number.clone(),
                is_reversed: false,
                original_entry_id: Some(entry.id.clone()),
                sequence: 0,
                posted_at: now,
            });
        }
        entries.sort_by_key(|entry| entry.entry_type != EntryType::Debit);

        self.store.insert_transaction(reversal.clone())?;

        let completed_at = Utc::now();
        let posting = Posting {
            entries,
            expected_heads,
            reversed_entries: originals.iter().map(|entry| entry.id.clone()).collect(),
            status_changes: vec![
                StatusChange {
                    transaction_id: original.id.clone(),
                    status: TransactionStatus::Reversed,
                    at: completed_at,
                },
                StatusChange {
                    transaction_id: reversal.id.clone(),
                    status: TransactionStatus::Completed,
                    at: completed_at,
                },
            ],
        };

        let stored = commit_or_fail(self.store.as_ref(), &reversal.id, posting)?;
        self.calculator.observe(&stored);

        Ok(FinancialTransaction {
            status: TransactionStatus::Completed,
            completed_at: Some(completed_at),
            ..reversal
        })
    }

    fn load_reversible(&self, id: &TransactionId) -> Result<FinancialTransaction, LedgerError> {
        let transaction = self
            .store
            .get_transaction(id)?
            .ok_or_else(|| LedgerError::transaction_not_found(id))?;

        let is_reversal = transaction.tx_type == TransactionType::Refund
            && transaction.related_transaction_id.is_some();
        if transaction.status != TransactionStatus::Completed || is_reversal {
            return Err(LedgerError::transaction_not_reversible(
                id,
                transaction.status,
            ));
        }
        Ok(transaction)
    }

    /// The original DEBIT and CREDIT, on two distinct accounts
    fn load_entries(&self, transaction: &FinancialTransaction) -> Result<[LedgerEntry; 2], LedgerError> {
        let entries = self.store.transaction_entries(&transaction.id)?;
        let count = entries.len();

        let pair: Option<[LedgerEntry; 2]> = entries.try_into().ok();
        match pair {
            Some([first, second])
                if first.entry_type != second.entry_type
                    && first.account_id != second.account_id
                    && first.amount == second.amount =>
            {
                Ok([first, second])
            }
            _ => {
                let error = LedgerError::corrupt(format!(
                    "transaction {} has {} entries, expected a balanced pair",
                    transaction.id, count
                ));
                tracing::error!("{}", error);
                Err(error)
            }
        }
    }

    /// Reversals may touch FROZEN accounts but never CLOSED ones
    fn load_open(&self, id: &AccountId) -> Result<Account, LedgerError> {
        let account = self
            .store
            .get_account(id)?
            .ok_or_else(|| LedgerError::account_not_found(id))?;
        if account.status == AccountStatus::Closed {
            return Err(LedgerError::account_closed(id));
        }
        Ok(account)
    }
}

impl std::fmt::Debug for ReversalHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReversalHandler").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::account_registry::AccountRegistry;
    use crate::core::memory_store::InMemoryStore;
    use crate::core::processor::TransactionProcessor;
    use crate::core::test_support::FailingCommitStore;
    use crate::core::traits::TracingAuditSink;
    use crate::types::{AccountType, NewAccount, OwnerType, PostedTransaction, TransferRequest};
    use rust_decimal::Decimal;

    struct Fixture {
        registry: AccountRegistry,
        processor: TransactionProcessor,
        reversals: Arc<ReversalHandler>,
        calculator: Arc<BalanceCalculator>,
        store: Arc<dyn LedgerStore>,
        float: Account,
        alice: Account,
        bob: Account,
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(InMemoryStore::new()))
    }

    fn fixture_with(store: Arc<dyn LedgerStore>) -> Fixture {
        let config = LedgerConfig::default();
        let numbering = NumberingService::new(Arc::clone(&store));
        let guards = Arc::new(AccountGuards::new(config.guard_timeout));
        let calculator = Arc::new(BalanceCalculator::new(
            Arc::clone(&store),
            config.sign_convention,
            true,
        ));
        let registry = AccountRegistry::new(
            Arc::clone(&store),
            numbering.clone(),
            Arc::clone(&guards),
            Arc::new(TracingAuditSink),
            3,
        );
        let processor = TransactionProcessor::new(
            Arc::clone(&store),
            numbering.clone(),
            Arc::clone(&guards),
            Arc::clone(&calculator),
            Arc::new(config),
        );
        let reversals = Arc::new(ReversalHandler::new(
            Arc::clone(&store),
            numbering,
            guards,
            Arc::clone(&calculator),
        ));

        let float = registry
            .create_account(NewAccount::system("Float", AccountType::Liability, "HTG"))
            .unwrap();
        let alice = registry
            .create_account(
                NewAccount::new("Alice", AccountType::Asset, "HTG").owned_by("alice", OwnerType::User),
            )
            .unwrap();
        let bob = registry
            .create_account(
                NewAccount::new("Bob", AccountType::Asset, "HTG").owned_by("bob", OwnerType::User),
            )
            .unwrap();

        Fixture {
            registry,
            processor,
            reversals,
            calculator,
            store,
            float,
            alice,
            bob,
        }
    }

    fn htg(units: i64) -> Decimal {
        Decimal::new(units * 100, 2)
    }

    async fn post(
        f: &Fixture,
        tx_type: TransactionType,
        from: &Account,
        to: &Account,
        amount: Decimal,
    ) -> PostedTransaction {
        f.processor
            .execute(TransferRequest::new(
                "tester",
                tx_type,
                from.id.clone(),
                to.id.clone(),
                amount,
                "HTG",
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reversal_restores_balances() {
        let f = fixture();
        post(&f, TransactionType::Deposit, &f.float, &f.alice, htg(500)).await;
        let transfer = post(&f, TransactionType::Transfer, &f.alice, &f.bob, htg(200)).await;
        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), htg(300));

        let reversal = f
            .reversals
            .reverse(&transfer.transaction.id, "support-1", "customer dispute")
            .await
            .unwrap();

        assert_eq!(reversal.tx_type, TransactionType::Refund);
        assert_eq!(reversal.status, TransactionStatus::Completed);
        assert_eq!(reversal.related_transaction_id.as_ref(), Some(&transfer.transaction.id));
        assert_eq!(reversal.initiator_id, "support-1");
        assert_eq!(reversal.description, "customer dispute");
        assert_ne!(reversal.transaction_number, transfer.transaction.transaction_number);

        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), htg(500));
        assert_eq!(f.calculator.balance(&f.bob.id).unwrap(), Decimal::ZERO);

        let original = f.store.get_transaction(&transfer.transaction.id).unwrap().unwrap();
        assert_eq!(original.status, TransactionStatus::Reversed);
        let original_entries = f.store.transaction_entries(&original.id).unwrap();
        assert!(original_entries.iter().all(|entry| entry.is_reversed));

        let offsets = f.store.transaction_entries(&reversal.id).unwrap();
        assert_eq!(offsets.len(), 2);
        for offset in &offsets {
            let source = original_entries
                .iter()
                .find(|entry| Some(&entry.id) == offset.original_entry_id.as_ref())
                .unwrap();
            assert_eq!(offset.account_id, source.account_id);
            assert_eq!(offset.entry_type, source.entry_type.flipped());
            assert_eq!(offset.amount, source.amount);
            assert!(!offset.is_reversed);
        }
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_original_untouched() {
        let store = Arc::new(FailingCommitStore::healthy());
        let f = fixture_with(Arc::clone(&store) as Arc<dyn LedgerStore>);
        post(&f, TransactionType::Deposit, &f.float, &f.alice, htg(100)).await;
        let transfer = post(&f, TransactionType::Transfer, &f.alice, &f.bob, htg(40)).await;

        store.start_failing();
        let result = f
            .reversals
            .reverse(&transfer.transaction.id, "ops", "wrong payee")
            .await;
        assert!(matches!(result, Err(LedgerError::StorageFailure { .. })));

        let original = f.store.get_transaction(&transfer.transaction.id).unwrap().unwrap();
        assert_eq!(original.status, TransactionStatus::Completed);
        assert!(f
            .store
            .transaction_entries(&original.id)
            .unwrap()
            .iter()
            .all(|entry| !entry.is_reversed));

        let refund = f
            .store
            .all_transactions()
            .unwrap()
            .into_iter()
            .find(|tx| tx.related_transaction_id.as_ref() == Some(&original.id))
            .unwrap();
        assert_eq!(refund.tx_type, TransactionType::Refund);
        assert_eq!(refund.status, TransactionStatus::Failed);
        assert!(refund.failed_at.is_some());
        assert!(f.store.transaction_entries(&refund.id).unwrap().is_empty());

        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), htg(60));
        assert_eq!(f.calculator.balance(&f.bob.id).unwrap(), htg(40));
    }

    #[tokio::test]
    async fn test_reversing_twice_is_rejected() {
        let f = fixture();
        let deposit = post(&f, TransactionType::Deposit, &f.float, &f.alice, htg(10)).await;

        let reversal = f
            .reversals
            .reverse(&deposit.transaction.id, "ops", "duplicate deposit")
            .await
            .unwrap();

        let again = f
            .reversals
            .reverse(&deposit.transaction.id, "ops", "duplicate deposit")
            .await;
        assert!(matches!(
            again,
            Err(LedgerError::TransactionNotReversible {
                status: TransactionStatus::Reversed,
                ..
            })
        ));

        // The refund itself cannot be reversed either
        let refund = f.reversals.reverse(&reversal.id, "ops", "undo").await;
        assert!(matches!(refund, Err(LedgerError::TransactionNotReversible { .. })));
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let f = fixture();
        let result = f
            .reversals
            .reverse(&TransactionId::from("missing"), "ops", "typo")
            .await;
        assert!(matches!(result, Err(LedgerError::TransactionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_frozen_account_can_be_reversed_closed_cannot() {
        let f = fixture();
        post(&f, TransactionType::Deposit, &f.float, &f.alice, htg(100)).await;
        let first = post(&f, TransactionType::Transfer, &f.alice, &f.bob, htg(10)).await;
        let second = post(&f, TransactionType::Transfer, &f.alice, &f.bob, htg(20)).await;

        f.registry
            .set_status(&f.bob.id, AccountStatus::Frozen, "compliance")
            .await
            .unwrap();
        f.reversals
            .reverse(&first.transaction.id, "ops", "fraud hold")
            .await
            .unwrap();
        assert_eq!(f.calculator.balance(&f.bob.id).unwrap(), htg(20));

        f.registry
            .set_status(&f.bob.id, AccountStatus::Closed, "compliance")
            .await
            .unwrap();
        let result = f
            .reversals
            .reverse(&second.transaction.id, "ops", "fraud hold")
            .await;
        assert!(matches!(result, Err(LedgerError::AccountClosed { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reversals_produce_one_refund() {
        let f = fixture();
        let deposit = post(&f, TransactionType::Deposit, &f.float, &f.alice, htg(10)).await;

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let reversals = Arc::clone(&f.reversals);
                let id = deposit.transaction.id.clone();
                tokio::spawn(async move { reversals.reverse(&id, "ops", "retry storm").await })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::TransactionNotReversible { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(succeeded, 1);
        let refunds = f
            .store
            .all_transactions()
            .unwrap()
            .into_iter()
            .filter(|tx| tx.tx_type == TransactionType::Refund)
            .count();
        assert_eq!(refunds, 1);
        assert_eq!(f.calculator.balance(&f.alice.id).unwrap(), Decimal::ZERO);
    }
}
