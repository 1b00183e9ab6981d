//! Ordered observer list with short-circuiting dispatch.

use std::sync::{Arc, PoisonError, RwLock};

use crate::event::TransactionEvent;
use crate::observer::{FnObserver, ObserverVeto, TransactionObserver};

/// Explicit list of pre-commit observers.
///
/// - Dispatch is synchronous, in registration order
/// - The first veto stops dispatch; later observers do not see the event
/// - Registration may happen at any time; a dispatch already running keeps
///   the list it started with
#[derive(Default)]
pub struct ObserverRegistry {
    observers: RwLock<Vec<Arc<dyn TransactionObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn TransactionObserver>) {
        // A panicking observer cannot leave the Vec half-written.
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Register a closure as an observer.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&TransactionEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnObserver::new(name, f)));
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every observer against `event`, stopping at the first veto.
    pub fn dispatch(&self, event: &TransactionEvent) -> Result<(), ObserverVeto> {
        // Snapshot so observers run without the lock held.
        let observers: Vec<Arc<dyn TransactionObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            if let Err(reason) = observer.on_transaction(event) {
                tracing::warn!(
                    observer = observer.name(),
                    src = %event.src(),
                    dest = %event.dest(),
                    amount = event.amount(),
                    "transfer vetoed: {reason}"
                );
                return Err(ObserverVeto::new(observer.name(), reason));
            }
        }

        Ok(())
    }
}

impl core::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use capital_core::{AccountId, AccountRef, Labels};

    use super::*;
    use crate::observer::TracingObserver;

    fn account(raw: &str) -> AccountRef {
        AccountRef::new(AccountId::from_raw(raw).unwrap())
    }

    fn event(amount: i64) -> TransactionEvent {
        TransactionEvent::new(
            account("a"),
            account("b"),
            amount,
            Labels::new().with("reason", "test"),
        )
    }

    #[test]
    fn empty_registry_allows_everything() {
        let registry = ObserverRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.dispatch(&event(10)).is_ok());
    }

    #[test]
    fn observers_run_in_registration_order() {
        let registry = ObserverRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            registry.register_fn(name, move |_| {
                seen.lock().unwrap().push(name);
                Ok(())
            });
        }

        registry.dispatch(&event(5)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn first_veto_short_circuits() {
        let registry = ObserverRegistry::new();
        let later_calls = Arc::new(Mutex::new(0));

        registry.register(Arc::new(TracingObserver));
        registry.register_fn("limit", |ev| {
            if ev.amount() > 100 {
                Err(format!("amount {} over limit", ev.amount()))
            } else {
                Ok(())
            }
        });
        let counter = later_calls.clone();
        registry.register_fn("audit", move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        registry.dispatch(&event(50)).unwrap();
        let veto = registry.dispatch(&event(500)).unwrap_err();

        assert_eq!(veto.observer, "limit");
        assert!(veto.reason.contains("500"));
        assert_eq!(*later_calls.lock().unwrap(), 1);
    }

    #[test]
    fn observers_see_event_fields() {
        let registry = ObserverRegistry::new();
        let captured = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        registry.register_fn("capture", move |ev| {
            *slot.lock().unwrap() = Some(ev.clone());
            Ok(())
        });

        let ev = event(7);
        registry.dispatch(&ev).unwrap();

        let got = captured.lock().unwrap().clone().unwrap();
        assert_eq!(got, ev);
        assert_eq!(got.src(), &account("a"));
        assert_eq!(got.labels().get("reason"), Some("test"));
    }

    #[test]
    fn event_serializes_for_audit_sinks() {
        let json = serde_json::to_value(event(3)).unwrap();
        assert_eq!(json["src"], "a");
        assert_eq!(json["amount"], 3);
        assert_eq!(json["labels"]["reason"], "test");
    }
}
