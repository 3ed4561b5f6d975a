//! Ledger configuration
//!
//! [`LedgerConfig`] gathers the knobs of the engine. Values that make no
//! sense (a zero timeout, a zero page size) are replaced by their defaults
//! with a warning rather than rejected, so a bad flag never stops the ledger
//! from starting.

use crate::core::balance::SignConvention;
use crate::types::{AccountType, TransactionType};
use std::time::Duration;

/// Configuration for the ledger engine
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    /// How long an operation may wait for its account guards
    pub guard_timeout: Duration,

    /// How DEBIT and CREDIT move balances
    pub sign_convention: SignConvention,

    /// Account types whose balance may not be debited below zero
    pub overdraft_protected: Vec<AccountType>,

    /// Transaction types allowed to overdraw protected accounts
    pub overdraft_exempt: Vec<TransactionType>,

    /// Serve `get_balance` from the write-through cache
    pub cache_balances: bool,

    /// Page size used when a caller asks for limit 0
    pub default_page_size: usize,

    /// Upper bound for any requested page size
    pub max_page_size: usize,

    /// Attempts at generating a unique account number before giving up
    pub account_number_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            guard_timeout: Duration::from_secs(5),
            sign_convention: SignConvention::default(),
            overdraft_protected: vec![AccountType::Asset],
            overdraft_exempt: vec![TransactionType::Adjustment],
            cache_balances: true,
            default_page_size: 50,
            max_page_size: 500,
            account_number_attempts: 5,
        }
    }
}

impl LedgerConfig {
    /// Create a LedgerConfig with a custom guard timeout and sign convention
    pub fn new(guard_timeout: Duration, sign_convention: SignConvention) -> Self {
        let default = Self::default();

        let guard_timeout = if guard_timeout.is_zero() {
            tracing::warn!(
                "Invalid guard_timeout ({:?}), using default ({:?})",
                guard_timeout,
                default.guard_timeout
            );
            default.guard_timeout
        } else {
            guard_timeout
        };

        Self {
            guard_timeout,
            sign_convention,
            ..default
        }
    }

    /// Override the page sizes used by statement queries
    pub fn with_page_sizes(mut self, default_page_size: usize, max_page_size: usize) -> Self {
        let fallback = Self::default();

        self.max_page_size = if max_page_size == 0 {
            tracing::warn!(
                "Invalid max_page_size ({}), using default ({})",
                max_page_size,
                fallback.max_page_size
            );
            fallback.max_page_size
        } else {
            max_page_size
        };

        self.default_page_size = if default_page_size == 0 {
            tracing::warn!(
                "Invalid default_page_size ({}), using default ({})",
                default_page_size,
                fallback.default_page_size
            );
            fallback.default_page_size.min(self.max_page_size)
        } else {
            default_page_size.min(self.max_page_size)
        };

        self
    }

    pub fn with_overdraft_protected(mut self, types: Vec<AccountType>) -> Self {
        self.overdraft_protected = types;
        self
    }

    pub fn with_overdraft_exempt(mut self, types: Vec<TransactionType>) -> Self {
        self.overdraft_exempt = types;
        self
    }

    pub fn with_balance_cache(mut self, enabled: bool) -> Self {
        self.cache_balances = enabled;
        self
    }

    pub fn is_overdraft_protected(&self, account_type: AccountType) -> bool {
        self.overdraft_protected.contains(&account_type)
    }

    pub fn is_overdraft_exempt(&self, tx_type: TransactionType) -> bool {
        self.overdraft_exempt.contains(&tx_type)
    }

    /// Effective page size for a requested limit
    pub fn page_limit(&self, requested: usize) -> usize {
        if requested == 0 {
            self.default_page_size
        } else {
            requested.min(self.max_page_size)
        }
    }
}
