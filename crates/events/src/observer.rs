//! Pre-commit observers.
//!
//! An observer sees each [`TransactionEvent`] before the transfer is
//! committed. Returning an error vetoes the transfer; returning `Ok(())` lets
//! it proceed. Observers are also the place for audit side effects.
//!
//! Observers run synchronously on the caller's task and must not start a new
//! transfer on the same accounts from inside `on_transaction`.

use thiserror::Error;

use crate::event::{Event, TransactionEvent};

/// Rejection of a pending transfer by a named observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer vetoed by {observer}: {reason}")]
pub struct ObserverVeto {
    pub observer: String,
    pub reason: String,
}

impl ObserverVeto {
    pub fn new(observer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            reason: reason.into(),
        }
    }
}

/// Receives pre-commit transaction events.
pub trait TransactionObserver: Send + Sync {
    /// Name used in veto errors and logs.
    fn name(&self) -> &str;

    /// Inspect a pending transfer leg. `Err(reason)` vetoes it.
    fn on_transaction(&self, event: &TransactionEvent) -> Result<(), String>;
}

/// Adapter turning a closure into a [`TransactionObserver`].
pub struct FnObserver<F> {
    name: String,
    f: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&TransactionEvent) -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> core::fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnObserver").field("name", &self.name).finish()
    }
}

impl<F> TransactionObserver for FnObserver<F>
where
    F: Fn(&TransactionEvent) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_transaction(&self, event: &TransactionEvent) -> Result<(), String> {
        (self.f)(event)
    }
}

/// Logs every pending transfer at debug level. Never vetoes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TransactionObserver for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_transaction(&self, event: &TransactionEvent) -> Result<(), String> {
        tracing::debug!(
            event_type = event.event_type(),
            version = event.version(),
            occurred_at = %event.occurred_at(),
            src = %event.src(),
            dest = %event.dest(),
            amount = event.amount(),
            labels = event.labels().len(),
            "pending transfer"
        );
        Ok(())
    }
}
