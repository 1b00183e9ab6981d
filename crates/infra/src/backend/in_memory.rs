use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use capital_core::{
    AccountId, BoundCheck, BoundLabels, IdempotencyKey, LabelSelector, Labels, TransactionId,
};
use capital_ledger::{AccountRecord, BackendError, PairTransfer, StorageBackend, TransferLeg};

/// A committed transaction as stored by [`InMemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub src: AccountId,
    pub dest: AccountId,
    pub amount: i64,
    pub labels: Labels,
    pub committed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct AccountEntry {
    id: AccountId,
    balance: i64,
    labels: Labels,
}

type KeyPair = (Option<IdempotencyKey>, Option<IdempotencyKey>);

#[derive(Debug, Default)]
struct State {
    /// Creation order; also the order returned by queries.
    accounts: Vec<AccountEntry>,
    index: HashMap<AccountId, usize>,
    transactions: HashMap<TransactionId, TransactionRecord>,
    replays: HashMap<KeyPair, (TransactionId, TransactionId)>,
}

impl State {
    fn position(&self, id: &AccountId) -> Result<usize, BackendError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| BackendError::AccountNotFound(id.clone()))
    }
}

/// Balances staged by a commit before it is written back.
#[derive(Default)]
struct Staged {
    balances: HashMap<usize, i64>,
    /// Touched accounts in first-touch order, for deterministic bound errors.
    touched: Vec<usize>,
}

impl Staged {
    fn balance(&self, state: &State, pos: usize) -> i64 {
        self.balances
            .get(&pos)
            .copied()
            .unwrap_or(state.accounts[pos].balance)
    }

    fn set(&mut self, pos: usize, balance: i64) {
        if self.balances.insert(pos, balance).is_none() {
            self.touched.push(pos);
        }
    }

    fn apply(&mut self, state: &State, leg: &TransferLeg) -> Result<(), BackendError> {
        let src = state.position(leg.src.id())?;
        let dest = state.position(leg.dest.id())?;

        let debited = self
            .balance(state, src)
            .checked_sub(leg.amount)
            .ok_or_else(|| BackendError::Underflow {
                account: leg.src.id().clone(),
            })?;
        self.set(src, debited);

        let credited = self
            .balance(state, dest)
            .checked_add(leg.amount)
            .ok_or_else(|| BackendError::Overflow {
                account: leg.dest.id().clone(),
            })?;
        self.set(dest, credited);

        Ok(())
    }

    /// Check touched accounts against the bounds stored in their labels.
    ///
    /// Net-debited accounts are held to their minimum, net-credited accounts
    /// to their maximum. An account already outside a bound may still move
    /// back towards it.
    fn check_bounds(&self, state: &State, keys: &BoundLabels) -> Result<(), BackendError> {
        for &pos in &self.touched {
            let account = &state.accounts[pos];
            let staged = self.balance(state, pos);
            let bounds = keys.bounds_of(&account.labels)?;
            match bounds.check(staged) {
                BoundCheck::BelowMin if staged < account.balance => {
                    return Err(BackendError::Underflow {
                        account: account.id.clone(),
                    });
                }
                BoundCheck::AboveMax if staged > account.balance => {
                    return Err(BackendError::Overflow {
                        account: account.id.clone(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn write(self, state: &mut State) {
        for (pos, balance) in self.balances {
            state.accounts[pos].balance = balance;
        }
    }
}

/// In-memory storage backend.
///
/// Intended for tests/dev. A single write lock around each commit gives
/// serializable transfers; a failed commit leaves no trace.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: RwLock<State>,
    fault: Mutex<Option<BackendError>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail with `error` after all legs are staged.
    pub fn inject_fault(&self, error: BackendError) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Amend an account label (backend-side; the ledger layer never does this).
    pub fn set_account_label(
        &self,
        account: &AccountId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), BackendError> {
        let mut state = self.write()?;
        let pos = state.position(account)?;
        state.accounts[pos].labels.insert(key, value);
        Ok(())
    }

    pub fn transaction(&self, id: &TransactionId) -> Result<Option<TransactionRecord>, BackendError> {
        Ok(self.read()?.transactions.get(id).cloned())
    }

    pub fn transaction_count(&self) -> Result<usize, BackendError> {
        Ok(self.read()?.transactions.len())
    }

    pub fn account_count(&self) -> Result<usize, BackendError> {
        Ok(self.read()?.accounts.len())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::Storage("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::Storage("lock poisoned".to_string()))
    }

    fn take_fault(&self) -> Option<BackendError> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Stage `legs`, check bounds, then write balances and records.
    ///
    /// Replay lookup and recording happen under the same write lock as the
    /// commit, so concurrent retries with one key pair apply at most once.
    fn commit(
        &self,
        legs: &[&TransferLeg],
        keys: &BoundLabels,
        replay_key: Option<KeyPair>,
    ) -> Result<Vec<TransactionId>, BackendError> {
        let mut state = self.write()?;

        if let Some(key) = &replay_key {
            if let Some((first, second)) = state.replays.get(key) {
                tracing::debug!(first = %first, second = %second, "replayed idempotent transfer pair");
                return Ok(vec![first.clone(), second.clone()]);
            }
        }

        let mut staged = Staged::default();
        for leg in legs {
            staged.apply(&state, leg)?;
        }
        staged.check_bounds(&state, keys)?;

        if let Some(fault) = self.take_fault() {
            return Err(fault);
        }

        staged.write(&mut state);

        let committed_at = Utc::now();
        let ids: Vec<TransactionId> = legs
            .iter()
            .map(|leg| {
                let id = TransactionId::generate();
                state.transactions.insert(
                    id.clone(),
                    TransactionRecord {
                        id: id.clone(),
                        src: leg.src.id().clone(),
                        dest: leg.dest.id().clone(),
                        amount: leg.amount,
                        labels: leg.labels.clone(),
                        committed_at,
                    },
                );
                id
            })
            .collect();

        if let (Some(key), [first, second]) = (replay_key, ids.as_slice()) {
            state.replays.insert(key, (first.clone(), second.clone()));
        }

        Ok(ids)
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn commit_transfer(
        &self,
        leg: &TransferLeg,
        bound_labels: &BoundLabels,
    ) -> Result<TransactionId, BackendError> {
        let mut ids = self.commit(&[leg], bound_labels, None)?;
        ids.pop()
            .ok_or_else(|| BackendError::Storage("commit produced no transaction".to_string()))
    }

    async fn commit_transfer_pair(
        &self,
        pair: &PairTransfer,
    ) -> Result<(TransactionId, TransactionId), BackendError> {
        let ids = self.commit(
            &[&pair.first, &pair.second],
            &pair.bound_labels,
            pair.idempotency_keys(),
        )?;
        let [first, second]: [TransactionId; 2] = ids
            .try_into()
            .map_err(|_| BackendError::Storage("pair commit produced wrong leg count".to_string()))?;
        Ok((first, second))
    }

    async fn find_accounts(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<AccountRecord>, BackendError> {
        let state = self.read()?;
        Ok(state
            .accounts
            .iter()
            .filter(|account| selector.matches(&account.labels))
            .map(|account| AccountRecord {
                id: account.id.clone(),
                labels: account.labels.clone(),
            })
            .collect())
    }

    async fn create_account(
        &self,
        initial_balance: i64,
        labels: Labels,
    ) -> Result<AccountId, BackendError> {
        let mut state = self.write()?;
        let id = AccountId::generate();
        let pos = state.accounts.len();
        state.accounts.push(AccountEntry {
            id: id.clone(),
            balance: initial_balance,
            labels,
        });
        state.index.insert(id.clone(), pos);
        Ok(id)
    }

    async fn balance(&self, account: &AccountId) -> Result<i64, BackendError> {
        let state = self.read()?;
        let pos = state.position(account)?;
        Ok(state.accounts[pos].balance)
    }
}

#[cfg(test)]
mod tests {
    use capital_core::AccountRef;
    use capital_core::labels::{ORACLE, VALUE_MAX, VALUE_MIN};

    use super::*;

    fn bounded(min: i64, max: i64) -> Labels {
        Labels::new()
            .with(VALUE_MIN, min.to_string())
            .with(VALUE_MAX, max.to_string())
    }

    async fn open(backend: &InMemoryBackend, balance: i64, labels: Labels) -> AccountRef {
        AccountRef::new(backend.create_account(balance, labels).await.unwrap())
    }

    fn leg(src: &AccountRef, dest: &AccountRef, amount: i64) -> TransferLeg {
        TransferLeg::new(src.clone(), dest.clone(), amount, Labels::new())
    }

    async fn send(backend: &InMemoryBackend, leg: &TransferLeg) -> Result<TransactionId, BackendError> {
        backend.commit_transfer(leg, &BoundLabels::default()).await
    }

    fn pair(first: TransferLeg, second: TransferLeg) -> PairTransfer {
        PairTransfer {
            first,
            second,
            bound_labels: BoundLabels::default(),
            first_key: None,
            second_key: None,
        }
    }

    #[tokio::test]
    async fn transfer_moves_value_and_records_transaction() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 100, bounded(0, 1000)).await;
        let b = open(&backend, 0, bounded(0, 1000)).await;

        let mut l = leg(&a, &b, 30);
        l.labels.insert("reason", "rent");
        let id = send(&backend, &l).await.unwrap();

        assert_eq!(backend.balance(a.id()).await.unwrap(), 70);
        assert_eq!(backend.balance(b.id()).await.unwrap(), 30);

        let record = backend.transaction(&id).unwrap().unwrap();
        assert_eq!(record.amount, 30);
        assert_eq!(&record.src, a.id());
        assert_eq!(record.labels.get("reason"), Some("rent"));
    }

    #[tokio::test]
    async fn underflow_and_overflow_leave_balances_untouched() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 100, bounded(0, 1000)).await;
        let b = open(&backend, 990, bounded(0, 1000)).await;

        let err = send(&backend, &leg(&a, &b, 150)).await.unwrap_err();
        assert_eq!(err, BackendError::Underflow { account: a.id().clone() });

        let err = send(&backend, &leg(&a, &b, 20)).await.unwrap_err();
        assert_eq!(err, BackendError::Overflow { account: b.id().clone() });

        assert_eq!(backend.balance(a.id()).await.unwrap(), 100);
        assert_eq!(backend.balance(b.id()).await.unwrap(), 990);
        assert_eq!(backend.transaction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn single_transfer_uses_bound_keys_from_request() {
        let backend = InMemoryBackend::new();
        let keys = BoundLabels::new("floor", "ceiling");
        let a = open(&backend, 10, Labels::new().with("floor", "8").with(VALUE_MIN, "-100")).await;
        let b = open(&backend, 0, Labels::new()).await;

        let err = backend.commit_transfer(&leg(&a, &b, 5), &keys).await.unwrap_err();
        assert_eq!(err, BackendError::Underflow { account: a.id().clone() });
        backend.commit_transfer(&leg(&a, &b, 2), &keys).await.unwrap();

        // Default keys read value_min instead.
        send(&backend, &leg(&a, &b, 50)).await.unwrap();
        assert_eq!(backend.balance(a.id()).await.unwrap(), -42);
    }

    #[tokio::test]
    async fn credit_to_account_below_minimum_is_allowed() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 100, bounded(0, 1000)).await;
        let b = open(&backend, 5, bounded(0, 1000)).await;
        backend.set_account_label(b.id(), VALUE_MIN, "50").unwrap();

        send(&backend, &leg(&a, &b, 10)).await.unwrap();
        assert_eq!(backend.balance(b.id()).await.unwrap(), 15);

        // Debiting it further is still an underflow.
        let err = send(&backend, &leg(&b, &a, 1)).await.unwrap_err();
        assert_eq!(err, BackendError::Underflow { account: b.id().clone() });
    }

    #[tokio::test]
    async fn debit_from_account_above_maximum_is_allowed() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 900, bounded(0, 1000)).await;
        let b = open(&backend, 0, bounded(0, 1000)).await;
        backend.set_account_label(a.id(), VALUE_MAX, "500").unwrap();

        send(&backend, &leg(&a, &b, 100)).await.unwrap();
        assert_eq!(backend.balance(a.id()).await.unwrap(), 800);

        let err = send(&backend, &leg(&b, &a, 1)).await.unwrap_err();
        assert_eq!(err, BackendError::Overflow { account: a.id().clone() });
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 100, Labels::new()).await;
        let ghost = AccountRef::new(AccountId::from_raw("ghost").unwrap());

        let err = send(&backend, &leg(&a, &ghost, 1)).await.unwrap_err();
        assert_eq!(err, BackendError::AccountNotFound(ghost.id().clone()));
    }

    #[tokio::test]
    async fn oracle_ignores_bounds_even_after_relabel() {
        let backend = InMemoryBackend::new();
        let mint = open(&backend, 0, Labels::new().with(ORACLE, "mint")).await;
        let a = open(&backend, 0, Labels::new()).await;
        backend.set_account_label(mint.id(), VALUE_MIN, "0").unwrap();

        send(&backend, &leg(&mint, &a, 500)).await.unwrap();
        assert_eq!(backend.balance(mint.id()).await.unwrap(), -500);
    }

    #[tokio::test]
    async fn malformed_bound_label_is_a_storage_error() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 10, Labels::new().with(VALUE_MIN, "zero")).await;
        let b = open(&backend, 0, Labels::new()).await;

        let err = send(&backend, &leg(&a, &b, 1)).await.unwrap_err();
        assert!(matches!(err, BackendError::Storage(_)));
    }

    #[tokio::test]
    async fn pair_checks_all_four_accounts() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 100, bounded(0, 1000)).await;
        let b = open(&backend, 0, bounded(0, 1000)).await;
        let c = open(&backend, 5, bounded(0, 1000)).await;
        let d = open(&backend, 0, bounded(0, 1000)).await;

        let err = backend
            .commit_transfer_pair(&pair(leg(&a, &b, 50), leg(&c, &d, 10)))
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::Underflow { account: c.id().clone() });

        for (acc, expected) in [(&a, 100), (&b, 0), (&c, 5), (&d, 0)] {
            assert_eq!(backend.balance(acc.id()).await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn pair_uses_bound_keys_from_request() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 10, Labels::new().with("floor", "5")).await;
        let b = open(&backend, 0, Labels::new()).await;

        let mut request = pair(leg(&a, &b, 6), leg(&b, &a, 0));
        backend.commit_transfer_pair(&request).await.unwrap();
        assert_eq!(backend.balance(a.id()).await.unwrap(), 4);

        request.bound_labels = BoundLabels::new("floor", "ceiling");
        let err = backend.commit_transfer_pair(&request).await.unwrap_err();
        assert_eq!(err, BackendError::Underflow { account: a.id().clone() });
    }

    #[tokio::test]
    async fn injected_fault_rolls_back_both_legs() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 100, Labels::new()).await;
        let b = open(&backend, 0, Labels::new()).await;

        backend.inject_fault(BackendError::Unavailable("disk full".into()));
        let err = backend
            .commit_transfer_pair(&pair(leg(&a, &b, 10), leg(&a, &b, 20)))
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Unavailable(_)));
        assert_eq!(backend.balance(a.id()).await.unwrap(), 100);
        assert_eq!(backend.transaction_count().unwrap(), 0);

        // The fault is one-shot.
        backend
            .commit_transfer_pair(&pair(leg(&a, &b, 10), leg(&a, &b, 20)))
            .await
            .unwrap();
        assert_eq!(backend.balance(b.id()).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn repeated_keys_replay_first_result() {
        let backend = InMemoryBackend::new();
        let a = open(&backend, 100, Labels::new()).await;
        let b = open(&backend, 0, Labels::new()).await;

        let mut request = pair(leg(&a, &b, 10), leg(&b, &a, 1));
        request.first_key = Some(IdempotencyKey::new());
        request.second_key = Some(IdempotencyKey::new());

        let first = backend.commit_transfer_pair(&request).await.unwrap();
        let again = backend.commit_transfer_pair(&request).await.unwrap();

        assert_eq!(first, again);
        assert_eq!(backend.balance(a.id()).await.unwrap(), 91);
        assert_eq!(backend.transaction_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn find_accounts_filters_in_creation_order() {
        let backend = InMemoryBackend::new();
        let gold1 = open(&backend, 0, Labels::new().with("currency", "gold")).await;
        open(&backend, 0, Labels::new().with("currency", "silver")).await;
        let gold2 = open(&backend, 0, Labels::new().with("currency", "gold")).await;

        let found: Vec<AccountId> = backend
            .find_accounts(&LabelSelector::all().with("currency", "gold"))
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();

        assert_eq!(found, vec![gold1.id().clone(), gold2.id().clone()]);
        assert_eq!(backend.account_count().unwrap(), 3);
    }
}
