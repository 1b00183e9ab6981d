//! Storage backend implementations.
//!
//! The contract lives in `capital_ledger::backend`; this module provides the
//! in-memory implementation used for tests, development and benchmarks.

pub mod in_memory;

pub use in_memory::{InMemoryBackend, TransactionRecord};
