//! Pre-commit transaction events and their observers.
//!
//! Replaces an implicit global event bus with an explicit, ordered
//! [`ObserverRegistry`] owned by the ledger engine.

pub mod event;
pub mod observer;
pub mod registry;

pub use event::{Event, TransactionEvent};
pub use observer::{FnObserver, ObserverVeto, TracingObserver, TransactionObserver};
pub use registry::ObserverRegistry;
