//! Oracle accounts: named, unbounded sources and sinks (e.g. a mint).

use capital_core::{AccountRef, LabelSelector, Labels, labels::ORACLE};

use crate::backend::StorageBackend;
use crate::config::DuplicateOraclePolicy;
use crate::engine::LedgerEngine;
use crate::error::{LedgerError, LedgerResult};

impl<B> LedgerEngine<B>
where
    B: StorageBackend,
{
    /// Get or create the oracle account called `name`.
    ///
    /// The new account starts at 0 and carries only `oracle = name`. No bound
    /// labels are written: an oracle that could run dry or fill up would make
    /// every transfer through it fail.
    ///
    /// Concurrent first calls for the same name may each create an account.
    /// Whether that is prevented is up to the backend; later calls see the
    /// duplicates and apply `LedgerConfig::duplicate_oracles`.
    pub async fn get_oracle(&self, name: &str) -> LedgerResult<AccountRef> {
        if name.is_empty() {
            return Err(LedgerError::Validation("oracle name must not be empty".into()));
        }

        let mut found = self.find_accounts(&LabelSelector::oracle(name)).await?;
        match found.len() {
            0 => {}
            1 => return Ok(found.swap_remove(0)),
            count => match self.config.duplicate_oracles {
                DuplicateOraclePolicy::Warn => {
                    tracing::warn!(
                        oracle = name,
                        count,
                        chosen = %found[0],
                        "duplicate oracle accounts; using the first"
                    );
                    return Ok(found.swap_remove(0));
                }
                DuplicateOraclePolicy::Reject => {
                    return Err(LedgerError::DuplicateOracle {
                        name: name.to_string(),
                        count,
                    });
                }
            },
        }

        let labels = Labels::new().with(ORACLE, name);
        let id = self
            .call("create_account", self.backend.create_account(0, labels))
            .await?;

        tracing::info!(oracle = name, account = %id, "oracle account created");
        Ok(AccountRef::new(id))
    }
}
