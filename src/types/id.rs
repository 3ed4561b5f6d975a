//! Opaque identifiers
//!
//! Every identifier crossing the ledger boundary is an opaque string. Fresh
//! identifiers are UUIDv7 so that they sort roughly by creation time, which
//! keeps guard acquisition order and listings stable in logs.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh identifier
            pub fn generate() -> Self {
                Self(uuid::Uuid::now_v7().to_string())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(
    /// Identifier of a ledger account
    AccountId
);

opaque_id!(
    /// Identifier of a financial transaction
    TransactionId
);

opaque_id!(
    /// Identifier of a single ledger entry
    EntryId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = AccountId::generate();
        let b = AccountId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_is_the_raw_string() {
        let id = TransactionId::from("tx-1");
        assert_eq!(id.to_string(), "tx-1");
        assert_eq!(id.as_str(), "tx-1");
    }

    #[test]
    fn test_serializes_transparently() {
        let id = EntryId::from("entry-9");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"entry-9\"");
    }
}
