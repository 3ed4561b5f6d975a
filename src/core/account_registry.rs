//! Account registry
//!
//! This module provides the [`AccountRegistry`], which opens accounts, looks
//! them up and drives their lifecycle.
//!
//! The registry is responsible for:
//! - Validating owner fields, names and currencies on creation
//! - Allocating a unique account number (regenerating on collision)
//! - Listing an owner's accounts, ACTIVE only unless asked otherwise
//! - Status transitions, serialised with postings via the account guard and
//!   reported to the [`AuditSink`]

use crate::core::guard::AccountGuards;
use crate::core::numbering::NumberingService;
use crate::core::traits::{AuditSink, LedgerStore, StatusAudit};
use crate::types::{
    Account, AccountFilter, AccountId, AccountStatus, Currency, LedgerError, NewAccount,
    OwnerType, StoreError,
};
use chrono::Utc;
use std::sync::Arc;

/// Creates, finds and transitions accounts
pub struct AccountRegistry {
    store: Arc<dyn LedgerStore>,
    numbering: NumberingService,
    guards: Arc<AccountGuards>,
    audit: Arc<dyn AuditSink>,
    number_attempts: u32,
}

/// Validated owner fields of a new account
struct Ownership {
    owner_id: Option<String>,
    owner_type: OwnerType,
}

impl AccountRegistry {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        numbering: NumberingService,
        guards: Arc<AccountGuards>,
        audit: Arc<dyn AuditSink>,
        number_attempts: u32,
    ) -> Self {
        Self {
            store,
            numbering,
            guards,
            audit,
            number_attempts: number_attempts.max(1),
        }
    }

    fn validate_ownership(request: &NewAccount) -> Result<Ownership, LedgerError> {
        let owner_id = request
            .owner_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        if request.is_system {
            if owner_id.is_some() {
                return Err(LedgerError::invalid_account_spec(
                    "system accounts cannot have an owner_id",
                ));
            }
            return match request.owner_type {
                None | Some(OwnerType::System) => Ok(Ownership {
                    owner_id: None,
                    owner_type: OwnerType::System,
                }),
                Some(other) => Err(LedgerError::invalid_account_spec(format!(
                    "system accounts must have owner_type SYSTEM, got {}",
                    other
                ))),
            };
        }

        match (owner_id, request.owner_type) {
            (Some(_), Some(OwnerType::System)) | (None, Some(OwnerType::System)) => Err(
                LedgerError::invalid_account_spec("owner_type SYSTEM is reserved for system accounts"),
            ),
            (Some(owner_id), Some(owner_type)) => Ok(Ownership {
                owner_id: Some(owner_id),
                owner_type,
            }),
            (Some(_), None) => Err(LedgerError::invalid_account_spec(
                "owner_id set without owner_type",
            )),
            (None, Some(_)) => Err(LedgerError::invalid_account_spec(
                "owner_type set without owner_id",
            )),
            (None, None) => Err(LedgerError::invalid_account_spec(
                "non-system accounts require owner_id and owner_type",
            )),
        }
    }

    /// Open a new ACTIVE account
    pub fn create_account(&self, request: NewAccount) -> Result<Account, LedgerError> {
        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::invalid_account_spec("name must not be empty"));
        }
        let currency = Currency::parse(&request.currency).ok_or_else(|| {
            LedgerError::invalid_account_spec(format!(
                "invalid currency code '{}'",
                request.currency
            ))
        })?;
        let ownership = Self::validate_ownership(&request)?;

        for attempt in 1..=self.number_attempts {
            let now = Utc::now();
            let account = Account {
                id: AccountId::generate(),
                account_number: self
                    .numbering
                    .next_account_number(request.account_type, ownership.owner_type),
                name: name.clone(),
                account_type: request.account_type,
                owner_id: ownership.owner_id.clone(),
                owner_type: Some(ownership.owner_type),
                currency: currency.clone(),
                status: AccountStatus::Active,
                is_system_account: request.is_system,
                metadata: request.metadata.clone().unwrap_or_default(),
                created_at: now,
                updated_at: now,
            };

            match self.store.insert_account(account.clone()) {
                Ok(()) => {
                    tracing::info!(
                        account_id = %account.id,
                        account_number = %account.account_number,
                        account_type = %account.account_type,
                        currency = %account.currency,
                        "account created"
                    );
                    return Ok(account);
                }
                Err(StoreError::Duplicate {
                    index: "account_number",
                    value,
                }) => {
                    tracing::debug!(attempt, account_number = %value, "account number collision");
                }
                Err(e) => {
                    tracing::error!("failed to store account: {}", e);
                    return Err(e.into());
                }
            }
        }

        let error = LedgerError::StorageFailure {
            message: format!(
                "no unique account number after {} attempts",
                self.number_attempts
            ),
        };
        tracing::error!("{}", error);
        Err(error)
    }

    pub fn get_account(&self, id: &AccountId) -> Result<Account, LedgerError> {
        self.store
            .get_account(id)?
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    /// Accounts of one owner, oldest first
    pub fn list_by_owner(
        &self,
        owner_id: &str,
        filter: &AccountFilter,
    ) -> Result<Vec<Account>, LedgerError> {
        let currency = match &filter.currency {
            Some(code) => Some(Currency::parse(code).ok_or_else(|| {
                LedgerError::invalid_account_spec(format!("invalid currency code '{}'", code))
            })?),
            None => None,
        };

        let mut accounts: Vec<Account> = self
            .store
            .accounts_by_owner(owner_id)?
            .into_iter()
            .filter(|account| filter.include_inactive || account.is_active())
            .filter(|account| {
                filter
                    .owner_type
                    .map_or(true, |owner_type| account.owner_type == Some(owner_type))
            })
            .filter(|account| currency.as_ref().map_or(true, |c| &account.currency == c))
            .collect();

        accounts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(accounts)
    }

    /// Move an account through its lifecycle on behalf of `actor_id`
    ///
    /// Re-applying the current status is a no-op and emits no audit record.
    pub async fn set_status(
        &self,
        id: &AccountId,
        new_status: AccountStatus,
        actor_id: &str,
    ) -> Result<Account, LedgerError> {
        if actor_id.trim().is_empty() {
            return Err(LedgerError::invalid_account_spec(
                "status changes require an actor id",
            ));
        }

        let _guard = self.guards.acquire(&[id]).await?;

        let account = self.get_account(id)?;
        if account.status == AccountStatus::Closed {
            return Err(LedgerError::account_closed(id));
        }
        if account.status == new_status {
            return Ok(account);
        }
        if !account.status.can_transition_to(new_status) {
            return Err(LedgerError::invalid_account_spec(format!(
                "cannot move account from {} to {}",
                account.status, new_status
            )));
        }

        let at = Utc::now();
        let updated = self.store.set_account_status(id, new_status, at)?;

        self.audit.record(&StatusAudit {
            account_id: id.clone(),
            from: account.status,
            to: new_status,
            actor_id: actor_id.to_string(),
            at,
        });

        Ok(updated)
    }
}

impl std::fmt::Debug for AccountRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountRegistry")
            .field("number_attempts", &self.number_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::InMemoryStore;
    use crate::types::{AccountType, Metadata};
    use rstest::rstest;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<StatusAudit>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, event: &StatusAudit) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn registry_with_sink() -> (AccountRegistry, Arc<RecordingSink>) {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let registry = AccountRegistry::new(
            Arc::clone(&store),
            NumberingService::new(store),
            Arc::new(AccountGuards::new(Duration::from_millis(200))),
            sink.clone(),
            5,
        );
        (registry, sink)
    }

    fn registry() -> AccountRegistry {
        registry_with_sink().0
    }

    #[test]
    fn test_create_user_account() {
        let registry = registry();
        let mut metadata = Metadata::new();
        metadata.insert("tier".to_string(), serde_json::json!("gold"));

        let account = registry
            .create_account(
                NewAccount::new("Wallet", AccountType::Asset, "htg")
                    .owned_by("user-1", OwnerType::User)
                    .with_metadata(metadata),
            )
            .unwrap();

        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.currency.as_str(), "HTG");
        assert_eq!(account.owner_type, Some(OwnerType::User));
        assert!(account.account_number.starts_with("AST-USR-"));
        assert_eq!(account.metadata["tier"], serde_json::json!("gold"));
        assert_eq!(registry.get_account(&account.id).unwrap(), account);
    }

    #[test]
    fn test_create_system_account_defaults_owner_type() {
        let registry = registry();

        let account = registry
            .create_account(NewAccount::system("Fees", AccountType::Revenue, "HTG"))
            .unwrap();

        assert!(account.is_system_account);
        assert_eq!(account.owner_id, None);
        assert_eq!(account.owner_type, Some(OwnerType::System));
        assert!(account.account_number.starts_with("REV-SYS-"));
    }

    #[rstest]
    #[case::owner_without_type(Some("user-1"), None, false)]
    #[case::type_without_owner(None, Some(OwnerType::User), false)]
    #[case::neither_on_user_account(None, None, false)]
    #[case::system_type_on_user_account(Some("user-1"), Some(OwnerType::System), false)]
    #[case::system_with_owner(Some("user-1"), None, true)]
    #[case::system_with_user_type(None, Some(OwnerType::Merchant), true)]
    fn test_invalid_ownership(
        #[case] owner_id: Option<&str>,
        #[case] owner_type: Option<OwnerType>,
        #[case] is_system: bool,
    ) {
        let mut request = NewAccount::new("Wallet", AccountType::Asset, "HTG");
        request.owner_id = owner_id.map(str::to_string);
        request.owner_type = owner_type;
        request.is_system = is_system;

        let result = registry().create_account(request);
        assert!(matches!(result, Err(LedgerError::InvalidAccountSpec { .. })));
    }

    #[rstest]
    #[case::empty_name("  ", "HTG")]
    #[case::bad_currency("Wallet", "H$G")]
    fn test_invalid_name_or_currency(#[case] name: &str, #[case] currency: &str) {
        let request =
            NewAccount::new(name, AccountType::Asset, currency).owned_by("user-1", OwnerType::User);
        let result = registry().create_account(request);
        assert!(matches!(result, Err(LedgerError::InvalidAccountSpec { .. })));
    }

    #[test]
    fn test_get_missing_account() {
        let result = registry().get_account(&AccountId::from("missing"));
        assert!(matches!(result, Err(LedgerError::AccountNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_by_owner_filters() {
        let registry = registry();
        let htg = registry
            .create_account(
                NewAccount::new("HTG wallet", AccountType::Asset, "HTG")
                    .owned_by("user-1", OwnerType::User),
            )
            .unwrap();
        let usd = registry
            .create_account(
                NewAccount::new("USD wallet", AccountType::Asset, "USD")
                    .owned_by("user-1", OwnerType::User),
            )
            .unwrap();
        let shop = registry
            .create_account(
                NewAccount::new("Shop", AccountType::Asset, "HTG")
                    .owned_by("user-1", OwnerType::Merchant),
            )
            .unwrap();
        registry
            .create_account(
                NewAccount::new("Other", AccountType::Asset, "HTG")
                    .owned_by("user-2", OwnerType::User),
            )
            .unwrap();
        registry
            .set_status(&usd.id, AccountStatus::Frozen, "compliance-1")
            .await
            .unwrap();

        let active = registry
            .list_by_owner("user-1", &AccountFilter::default())
            .unwrap();
        assert_eq!(
            active.iter().map(|a| &a.id).collect::<Vec<_>>(),
            vec![&htg.id, &shop.id]
        );

        let all = registry
            .list_by_owner(
                "user-1",
                &AccountFilter {
                    include_inactive: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(all.len(), 3);

        let merchant_htg = registry
            .list_by_owner(
                "user-1",
                &AccountFilter {
                    owner_type: Some(OwnerType::Merchant),
                    currency: Some("htg".to_string()),
                    include_inactive: false,
                },
            )
            .unwrap();
        assert_eq!(merchant_htg.len(), 1);
        assert_eq!(merchant_htg[0].id, shop.id);
    }

    #[tokio::test]
    async fn test_status_lifecycle_and_audit() {
        let (registry, sink) = registry_with_sink();
        let account = registry
            .create_account(
                NewAccount::new("Wallet", AccountType::Asset, "HTG")
                    .owned_by("user-1", OwnerType::User),
            )
            .unwrap();

        let frozen = registry
            .set_status(&account.id, AccountStatus::Frozen, "officer-7")
            .await
            .unwrap();
        assert_eq!(frozen.status, AccountStatus::Frozen);

        // Re-freezing is a no-op
        registry
            .set_status(&account.id, AccountStatus::Frozen, "officer-7")
            .await
            .unwrap();

        registry
            .set_status(&account.id, AccountStatus::Active, "officer-7")
            .await
            .unwrap();
        registry
            .set_status(&account.id, AccountStatus::Closed, "officer-8")
            .await
            .unwrap();

        let result = registry
            .set_status(&account.id, AccountStatus::Active, "officer-8")
            .await;
        assert!(matches!(result, Err(LedgerError::AccountClosed { .. })));

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].from, AccountStatus::Active);
        assert_eq!(events[0].to, AccountStatus::Frozen);
        assert_eq!(events[0].actor_id, "officer-7");
        assert_eq!(events[2].to, AccountStatus::Closed);
        assert_eq!(events[2].actor_id, "officer-8");
    }

    #[tokio::test]
    async fn test_status_change_requires_actor() {
        let registry = registry();
        let account = registry
            .create_account(
                NewAccount::new("Wallet", AccountType::Asset, "HTG")
                    .owned_by("user-1", OwnerType::User),
            )
            .unwrap();

        let result = registry
            .set_status(&account.id, AccountStatus::Frozen, " ")
            .await;
        assert!(matches!(result, Err(LedgerError::InvalidAccountSpec { .. })));
    }
}
