//! Account-related types for the ledger
//!
//! An account carries identity, classification and lifecycle state only. Its
//! balance is never stored here: it is always derived from the entry history
//! (see [`crate::core::balance`]).

use super::id::AccountId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Opaque key/value bag attached to accounts
///
/// Values are validated by collaborators before they reach the ledger; the
/// ledger only stores and returns them.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Accounting classification of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// Three-letter code used in account numbers
    pub fn code(self) -> &'static str {
        match self {
            AccountType::Asset => "AST",
            AccountType::Liability => "LIA",
            AccountType::Equity => "EQT",
            AccountType::Revenue => "REV",
            AccountType::Expense => "EXP",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ASSET" => Ok(AccountType::Asset),
            "LIABILITY" => Ok(AccountType::Liability),
            "EQUITY" => Ok(AccountType::Equity),
            "REVENUE" => Ok(AccountType::Revenue),
            "EXPENSE" => Ok(AccountType::Expense),
            other => Err(format!("Invalid account type: '{}'", other)),
        }
    }
}

/// Kind of party owning an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OwnerType {
    User,
    Merchant,
    Distributor,
    Diaspora,
    System,
}

impl OwnerType {
    /// Owner scope code used in account numbers
    pub fn scope_code(self) -> &'static str {
        match self {
            OwnerType::User => "USR",
            OwnerType::Merchant => "MER",
            OwnerType::Distributor => "DST",
            OwnerType::Diaspora => "DSP",
            OwnerType::System => "SYS",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OwnerType::User => "USER",
            OwnerType::Merchant => "MERCHANT",
            OwnerType::Distributor => "DISTRIBUTOR",
            OwnerType::Diaspora => "DIASPORA",
            OwnerType::System => "SYSTEM",
        }
    }
}

impl fmt::Display for OwnerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "USER" => Ok(OwnerType::User),
            "MERCHANT" => Ok(OwnerType::Merchant),
            "DISTRIBUTOR" => Ok(OwnerType::Distributor),
            "DIASPORA" => Ok(OwnerType::Diaspora),
            "SYSTEM" => Ok(OwnerType::System),
            other => Err(format!("Invalid owner type: '{}'", other)),
        }
    }
}

/// Lifecycle state of an account
///
/// `Closed` is terminal: no further entries or transitions are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

impl AccountStatus {
    /// Whether the lifecycle allows moving from `self` to `next`
    ///
    /// Re-applying the current status is not a transition and returns false.
    pub fn can_transition_to(self, next: AccountStatus) -> bool {
        matches!(
            (self, next),
            (AccountStatus::Active, AccountStatus::Frozen)
                | (AccountStatus::Frozen, AccountStatus::Active)
                | (AccountStatus::Active, AccountStatus::Closed)
                | (AccountStatus::Frozen, AccountStatus::Closed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Frozen => "FROZEN",
            AccountStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ISO-like currency code, normalised to upper case
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Parse and normalise a currency code
    ///
    /// Accepts 3 to 5 ASCII alphanumeric characters (e.g. `HTG`, `USD`,
    /// `USDC`) in any case.
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        let valid = (3..=5).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then(|| Currency(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Human-traceable unique code: `{TYPE}-{OWNER_SCOPE}-{TIMESTAMP}-{RANDOM}`
    pub account_number: String,

    pub name: String,
    pub account_type: AccountType,

    /// `None` for system accounts
    pub owner_id: Option<String>,
    pub owner_type: Option<OwnerType>,

    /// Fixed at creation
    pub currency: Currency,

    pub status: AccountStatus,
    pub is_system_account: bool,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account accepts new postings
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Request to open an account
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub owner_id: Option<String>,
    pub owner_type: Option<OwnerType>,
    pub currency: String,
    pub is_system: bool,
    pub metadata: Option<Metadata>,
}

impl NewAccount {
    /// Start a request for an end-user or business account
    pub fn new(name: impl Into<String>, account_type: AccountType, currency: &str) -> Self {
        NewAccount {
            name: name.into(),
            account_type,
            owner_id: None,
            owner_type: None,
            currency: currency.to_string(),
            is_system: false,
            metadata: None,
        }
    }

    /// Start a request for a system account (fees, revenue, float)
    pub fn system(name: impl Into<String>, account_type: AccountType, currency: &str) -> Self {
        NewAccount {
            is_system: true,
            ..Self::new(name, account_type, currency)
        }
    }

    pub fn owned_by(mut self, owner_id: impl Into<String>, owner_type: OwnerType) -> Self {
        self.owner_id = Some(owner_id.into());
        self.owner_type = Some(owner_type);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Filter for [`crate::Ledger::list_accounts_by_owner`]
#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub owner_type: Option<OwnerType>,
    pub currency: Option<String>,

    /// Also return FROZEN and CLOSED accounts
    pub include_inactive: bool,
}
