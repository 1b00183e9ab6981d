//! Value handles returned to callers.

use serde::{Deserialize, Serialize};

use crate::id::{AccountId, TransactionId};
/// Reference to a ledger account.
///
/// Purely a handle: holding one says nothing about the account's balance or
/// whether it still exists at commit time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountRef(AccountId);

impl AccountRef {
    pub fn new(id: AccountId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> &AccountId {
        &self.0
    }
}

impl From<AccountId> for AccountRef {
    fn from(value: AccountId) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Reference to a committed transaction (proof of commit).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(TransactionId);

impl TransactionRef {
    pub fn new(id: TransactionId) -> Self {
        Self(id)
    }

    pub fn id(&self) -> &TransactionId {
        &self.0
    }
}

impl core::fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
