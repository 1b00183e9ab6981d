//! Infrastructure layer: storage backends for the ledger engine.

pub mod backend;


pub use backend::{InMemoryBackend, TransactionRecord};
