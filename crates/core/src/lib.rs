//! `capital-core`: ledger value types.
//!
//! Identifiers, account/transaction handles, labels, selectors and bounds.
//! Pure values only: no IO, no async, no storage concerns.

pub mod bounds;
pub mod error;
pub mod id;
pub mod labels;
pub mod refs;

pub use bounds::{BoundCheck, BoundLabels, Bounds};
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, IdempotencyKey, TransactionId};
pub use labels::{LabelSelector, Labels};
pub use refs::{AccountRef, TransactionRef};
