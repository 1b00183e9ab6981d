//! Ledger orchestration.
//!
//! `LedgerEngine` is the only caller of the storage backend for transfers,
//! account queries and account creation. Every transfer follows the same
//! pipeline:
//!
//! ```text
//! transfer request
//!   ↓
//! 1. Validate the amount (nothing dispatched on failure)
//!   ↓
//! 2. Raise one TransactionEvent per leg (observers may veto)
//!   ↓
//! 3. One atomic backend commit (awaited, optionally under a timeout)
//!   ↓
//! 4. Wrap the backend ids in TransactionRefs
//! ```
//!
//! The engine holds no lock on account state. Balances, bounds and
//! idempotency are the backend's job; concurrent callers interleave at the
//! backend `.await` points and the backend decides the commit order.

use std::future::Future;

use capital_core::{
    AccountRef, BoundCheck, IdempotencyKey, LabelSelector, Labels, TransactionRef,
};
use capital_events::{ObserverRegistry, ObserverVeto, TransactionEvent};

use crate::backend::{BackendError, PairTransfer, StorageBackend, TransferLeg};
use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// Entry point for moving value between accounts.
///
/// ## Generic parameters
///
/// - `B`: the storage backend. `Arc<B>` works too, which lets callers keep a
///   handle on the backend for inspection.
///
/// ## Cancellation
///
/// Every backend call is an `.await` point. Dropping the returned future while
/// a commit is outstanding leaves the commit's outcome to the backend; the
/// engine does not compensate. Set `LedgerConfig::commit_timeout` to get a
/// `LedgerError::OutcomeUnknown` instead of waiting forever.
#[derive(Debug)]
pub struct LedgerEngine<B> {
    pub(crate) backend: B,
    pub(crate) observers: ObserverRegistry,
    pub(crate) config: LedgerConfig,
}

impl<B> LedgerEngine<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, LedgerConfig::default())
    }

    pub fn with_config(backend: B, config: LedgerConfig) -> Self {
        Self {
            backend,
            observers: ObserverRegistry::new(),
            config,
        }
    }

    /// Pre-commit observers. Register here; dispatch happens on every transfer.
    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}

impl<B> LedgerEngine<B>
where
    B: StorageBackend,
{
    /// Move `amount` from `src` to `dest` atomically.
    ///
    /// The pre-commit event is dispatched before the backend is contacted; a
    /// veto means the backend is never called. Bounds are read from the
    /// label keys in `LedgerConfig::bound_labels`, the same keys used by
    /// `transfer_pair` and `create_account`.
    pub async fn transfer(
        &self,
        src: &AccountRef,
        dest: &AccountRef,
        amount: i64,
        labels: Labels,
    ) -> LedgerResult<TransactionRef> {
        let leg = TransferLeg::new(src.clone(), dest.clone(), amount, labels);
        validate_leg(&leg)?;

        self.raise(&leg)?;

        let id = self
            .call(
                "transfer",
                self.backend
                    .commit_transfer(&leg, &self.config.bound_labels),
            )
            .await?;

        tracing::debug!(tx = %id, src = %leg.src, dest = %leg.dest, amount, "transfer committed");
        Ok(TransactionRef::new(id))
    }

    /// Commit two transfers as one atomic unit.
    ///
    /// Both events are dispatched (first leg first) before the backend is
    /// contacted. The bound check covers all four accounts. Keys are passed to
    /// the backend as-is: retrying with the same pair returns the ids of the
    /// first successful call without moving value again.
    pub async fn transfer_pair(
        &self,
        first: TransferLeg,
        second: TransferLeg,
        first_key: Option<IdempotencyKey>,
        second_key: Option<IdempotencyKey>,
    ) -> LedgerResult<(TransactionRef, TransactionRef)> {
        validate_leg(&first)?;
        validate_leg(&second)?;

        self.raise(&first)?;
        self.raise(&second)?;

        let pair = PairTransfer {
            first,
            second,
            bound_labels: self.config.bound_labels.clone(),
            first_key,
            second_key,
        };

        let (id1, id2) = self
            .call("transfer_pair", self.backend.commit_transfer_pair(&pair))
            .await?;

        tracing::debug!(first = %id1, second = %id2, "transfer pair committed");
        Ok((TransactionRef::new(id1), TransactionRef::new(id2)))
    }

    /// Accounts whose labels contain every pair in `selector`.
    ///
    /// One backend round trip; order is whatever the backend returns.
    pub async fn find_accounts(&self, selector: &LabelSelector) -> LedgerResult<Vec<AccountRef>> {
        let records = self
            .call("find_accounts", self.backend.find_accounts(selector))
            .await?;

        Ok(records
            .into_iter()
            .map(|record| AccountRef::new(record.id))
            .collect())
    }

    /// Create an ordinary (non-oracle) account.
    ///
    /// Default bounds from the config are written into the labels for each
    /// bound the caller left unset. Oracle accounts go through `get_oracle`.
    pub async fn create_account(
        &self,
        initial_balance: i64,
        mut labels: Labels,
    ) -> LedgerResult<AccountRef> {
        if let Some(name) = labels.oracle_name() {
            return Err(LedgerError::Validation(format!(
                "oracle account '{name}' must be resolved through get_oracle"
            )));
        }

        let keys = &self.config.bound_labels;
        keys.fill_defaults(&mut labels, self.config.default_bounds);

        let bounds = keys.bounds_of(&labels)?;
        if bounds.check(initial_balance) != BoundCheck::Within {
            return Err(LedgerError::Validation(format!(
                "initial balance {initial_balance} is outside {bounds:?}"
            )));
        }

        let id = self
            .call(
                "create_account",
                self.backend.create_account(initial_balance, labels),
            )
            .await?;

        tracing::debug!(account = %id, initial_balance, "account created");
        Ok(AccountRef::new(id))
    }

    pub async fn balance(&self, account: &AccountRef) -> LedgerResult<i64> {
        self.call("balance", self.backend.balance(account.id()))
            .await
    }

    fn raise(&self, leg: &TransferLeg) -> Result<(), ObserverVeto> {
        let event = TransactionEvent::new(
            leg.src.clone(),
            leg.dest.clone(),
            leg.amount,
            leg.labels.clone(),
        );
        self.observers.dispatch(&event)
    }

    /// Await a backend call, applying the configured timeout.
    pub(crate) async fn call<T, F>(&self, operation: &'static str, fut: F) -> LedgerResult<T>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let Some(limit) = self.config.commit_timeout else {
            return fut.await.map_err(LedgerError::from);
        };

        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(LedgerError::from),
            Err(_) => {
                tracing::warn!(operation, timeout = ?limit, "backend call timed out");
                Err(LedgerError::OutcomeUnknown { operation })
            }
        }
    }
}

fn validate_leg(leg: &TransferLeg) -> LedgerResult<()> {
    if leg.amount < 0 {
        return Err(LedgerError::Validation(format!(
            "amount must be non-negative, got {} (swap src and dest instead)",
            leg.amount
        )));
    }
    Ok(())
}
