use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capital_core::{AccountRef, Labels};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "capital.transaction.pre_commit").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}

/// Pre-commit notification for one leg of a transfer.
///
/// Raised strictly before the corresponding commit reaches the backend, so
/// observers see every transfer that is about to be attempted (including
/// ones that the backend later rejects). Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    src: AccountRef,
    dest: AccountRef,
    amount: i64,
    labels: Labels,
    occurred_at: DateTime<Utc>,
}

impl TransactionEvent {
    pub fn new(src: AccountRef, dest: AccountRef, amount: i64, labels: Labels) -> Self {
        Self {
            src,
            dest,
            amount,
            labels,
            occurred_at: Utc::now(),
        }
    }

    pub fn src(&self) -> &AccountRef {
        &self.src
    }

    pub fn dest(&self) -> &AccountRef {
        &self.dest
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }
}

impl Event for TransactionEvent {
    fn event_type(&self) -> &'static str {
        "capital.transaction.pre_commit"
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}
