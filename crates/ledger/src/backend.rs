//! Storage backend boundary.
//!
//! The ledger engine never touches balances itself. Everything that must be
//! atomic (moving value, checking bounds, deduplicating retries) is delegated
//! to a [`StorageBackend`], which is expected to be transactional.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use capital_core::{
    AccountId, AccountRef, BoundLabels, DomainError, IdempotencyKey, LabelSelector, Labels,
    TransactionId,
};

/// One leg of a transfer: move `amount` from `src` to `dest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    pub src: AccountRef,
    pub dest: AccountRef,
    /// Non-negative amount in the smallest currency unit.
    pub amount: i64,
    /// Labels recorded on the committed transaction.
    pub labels: Labels,
}

impl TransferLeg {
    pub fn new(src: AccountRef, dest: AccountRef, amount: i64, labels: Labels) -> Self {
        Self {
            src,
            dest,
            amount,
            labels,
        }
    }
}

/// Two legs that must commit or abort together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairTransfer {
    pub first: TransferLeg,
    pub second: TransferLeg,
    /// Label keys holding each account's bounds; applied to all four accounts.
    pub bound_labels: BoundLabels,
    pub first_key: Option<IdempotencyKey>,
    pub second_key: Option<IdempotencyKey>,
}

impl PairTransfer {
    /// The key pair used for deduplication, if the caller supplied any key.
    pub fn idempotency_keys(&self) -> Option<(Option<IdempotencyKey>, Option<IdempotencyKey>)> {
        if self.first_key.is_none() && self.second_key.is_none() {
            None
        } else {
            Some((self.first_key, self.second_key))
        }
    }
}

/// An account as returned by a label query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: AccountId,
    pub labels: Labels,
}

/// Failure reported by a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The account would drop below its minimum bound.
    #[error("account {account} would fall below its minimum balance")]
    Underflow { account: AccountId },

    /// The account would exceed its maximum bound.
    #[error("account {account} would exceed its maximum balance")]
    Overflow { account: AccountId },

    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Any other storage failure (constraint violation, corrupt data, ...).
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<DomainError> for BackendError {
    fn from(value: DomainError) -> Self {
        BackendError::Storage(value.to_string())
    }
}

/// Persistent store of accounts and transactions.
///
/// Implementations must:
/// - commit each transfer (and both legs of a pair) atomically
/// - enforce bounds stored under the bound label keys carried by each
///   request, exempting accounts labelled as oracles
/// - return the original transaction ids when a pair is retried with the same
///   idempotency keys, without applying it again
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Atomically move value between one pair of accounts, checking bounds
    /// stored under `bound_labels`.
    async fn commit_transfer(
        &self,
        leg: &TransferLeg,
        bound_labels: &BoundLabels,
    ) -> Result<TransactionId, BackendError>;

    /// Atomically commit two legs as one unit.
    async fn commit_transfer_pair(
        &self,
        pair: &PairTransfer,
    ) -> Result<(TransactionId, TransactionId), BackendError>;

    /// Accounts whose labels contain every pair of `selector`.
    async fn find_accounts(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<AccountRecord>, BackendError>;

    async fn create_account(
        &self,
        initial_balance: i64,
        labels: Labels,
    ) -> Result<AccountId, BackendError>;

    async fn balance(&self, account: &AccountId) -> Result<i64, BackendError>;
}

#[async_trait]
impl<B> StorageBackend for Arc<B>
where
    B: StorageBackend + ?Sized,
{
    async fn commit_transfer(
        &self,
        leg: &TransferLeg,
        bound_labels: &BoundLabels,
    ) -> Result<TransactionId, BackendError> {
        (**self).commit_transfer(leg, bound_labels).await
    }

    async fn commit_transfer_pair(
        &self,
        pair: &PairTransfer,
    ) -> Result<(TransactionId, TransactionId), BackendError> {
        (**self).commit_transfer_pair(pair).await
    }

    async fn find_accounts(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<AccountRecord>, BackendError> {
        (**self).find_accounts(selector).await
    }

    async fn create_account(
        &self,
        initial_balance: i64,
        labels: Labels,
    ) -> Result<AccountId, BackendError> {
        (**self).create_account(initial_balance, labels).await
    }

    async fn balance(&self, account: &AccountId) -> Result<i64, BackendError> {
        (**self).balance(account).await
    }
}
