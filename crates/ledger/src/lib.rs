//! `capital-ledger`: transfer orchestration over a pluggable storage backend.
//!
//! The engine validates requests, raises pre-commit events to observers and
//! hands atomic commits to a [`StorageBackend`]. It performs no retries and
//! keeps no account state of its own.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod oracle;

pub use backend::{AccountRecord, BackendError, PairTransfer, StorageBackend, TransferLeg};
pub use config::{DuplicateOraclePolicy, LedgerConfig};
pub use engine::LedgerEngine;
pub use error::{LedgerError, LedgerResult};
