use thiserror::Error;

use capital_core::{AccountId, DomainError};
use capital_events::ObserverVeto;

use crate::backend::BackendError;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error surfaced by ledger operations.
///
/// Nothing here is retried. The variants split into three outcome classes:
/// - never started: `Validation`, `ObserverVeto`, `DuplicateOracle`
/// - rejected by the backend (nothing applied): `Underflow`, `Overflow`,
///   `NotFound`, `Backend`
/// - unknown: `OutcomeUnknown` (the backend call did not answer in time) and
///   `Unavailable` (the connection failed, possibly mid-commit)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Source balance would fall below its minimum bound.
    #[error("account {account} would fall below its minimum balance")]
    Underflow { account: AccountId },

    /// Destination balance would exceed its maximum bound.
    #[error("account {account} would exceed its maximum balance")]
    Overflow { account: AccountId },

    #[error(transparent)]
    ObserverVeto(#[from] ObserverVeto),

    /// A referenced account does not exist at commit time.
    #[error("account not found: {0}")]
    NotFound(AccountId),

    /// The backend could not be reached or dropped the connection.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected the call for a storage reason.
    #[error("backend failure: {0}")]
    Backend(String),

    /// More than one account carries the same oracle label.
    #[error("{count} accounts are labelled as oracle '{name}'")]
    DuplicateOracle { name: String, count: usize },

    /// The backend call timed out; it may or may not have committed.
    #[error("outcome of {operation} unknown: backend did not respond in time")]
    OutcomeUnknown { operation: &'static str },
}

impl From<BackendError> for LedgerError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Underflow { account } => LedgerError::Underflow { account },
            BackendError::Overflow { account } => LedgerError::Overflow { account },
            BackendError::AccountNotFound(id) => LedgerError::NotFound(id),
            BackendError::Unavailable(msg) => LedgerError::Unavailable(msg),
            BackendError::Storage(msg) => LedgerError::Backend(msg),
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        LedgerError::Validation(value.to_string())
    }
}

impl LedgerError {
    /// True when the transfer certainly did not commit.
    pub fn is_definitely_not_applied(&self) -> bool {
        !matches!(
            self,
            LedgerError::OutcomeUnknown { .. } | LedgerError::Unavailable(_)
        )
    }
}
