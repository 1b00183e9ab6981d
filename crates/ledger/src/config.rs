//! Engine configuration.
//!
//! Loaded from `CAPITAL_*` environment variables with defaults for anything
//! unset. Bounds are label-driven, so the config names the label keys rather
//! than fixing numeric limits per account.

use core::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use capital_core::{BoundLabels, Bounds, DomainError, DomainResult};

pub const ENV_VALUE_MIN_LABEL: &str = "CAPITAL_VALUE_MIN_LABEL";
pub const ENV_VALUE_MAX_LABEL: &str = "CAPITAL_VALUE_MAX_LABEL";
pub const ENV_DEFAULT_VALUE_MIN: &str = "CAPITAL_DEFAULT_VALUE_MIN";
pub const ENV_DEFAULT_VALUE_MAX: &str = "CAPITAL_DEFAULT_VALUE_MAX";
pub const ENV_COMMIT_TIMEOUT_MS: &str = "CAPITAL_COMMIT_TIMEOUT_MS";
pub const ENV_DUPLICATE_ORACLES: &str = "CAPITAL_DUPLICATE_ORACLES";

/// What `get_oracle` does when several accounts carry the same oracle label.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateOraclePolicy {
    /// Log a warning and use the first account in backend order.
    #[default]
    Warn,
    /// Fail with `LedgerError::DuplicateOracle`.
    Reject,
}

impl FromStr for DuplicateOraclePolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(Self::Warn),
            "reject" => Ok(Self::Reject),
            other => Err(DomainError::validation(format!(
                "{ENV_DUPLICATE_ORACLES}: expected 'warn' or 'reject', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Label keys holding account bounds.
    pub bound_labels: BoundLabels,
    /// Bounds written onto ordinary accounts created through the engine.
    pub default_bounds: Bounds,
    /// Upper limit on any single backend call.
    pub commit_timeout: Option<Duration>,
    pub duplicate_oracles: DuplicateOraclePolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            bound_labels: BoundLabels::default(),
            default_bounds: Bounds::new(Some(0), None),
            commit_timeout: None,
            duplicate_oracles: DuplicateOraclePolicy::Warn,
        }
    }
}

impl LedgerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> DomainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let min_key = lookup(ENV_VALUE_MIN_LABEL).unwrap_or(defaults.bound_labels.min_key);
        let max_key = lookup(ENV_VALUE_MAX_LABEL).unwrap_or(defaults.bound_labels.max_key);
        if min_key.is_empty() || max_key.is_empty() || min_key == max_key {
            return Err(DomainError::validation(
                "bound label keys must be non-empty and distinct",
            ));
        }

        let min = match lookup(ENV_DEFAULT_VALUE_MIN) {
            Some(raw) => parse_optional_i64(ENV_DEFAULT_VALUE_MIN, &raw)?,
            None => defaults.default_bounds.min,
        };
        let max = match lookup(ENV_DEFAULT_VALUE_MAX) {
            Some(raw) => parse_optional_i64(ENV_DEFAULT_VALUE_MAX, &raw)?,
            None => defaults.default_bounds.max,
        };
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(DomainError::validation(format!(
                    "default bounds are empty: min {min} > max {max}"
                )));
            }
        }

        let commit_timeout = match lookup(ENV_COMMIT_TIMEOUT_MS) {
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| {
                    DomainError::validation(format!("{ENV_COMMIT_TIMEOUT_MS}: {e}"))
                })?;
                (ms > 0).then(|| Duration::from_millis(ms))
            }
            None => defaults.commit_timeout,
        };

        let duplicate_oracles = match lookup(ENV_DUPLICATE_ORACLES) {
            Some(raw) => raw.parse()?,
            None => defaults.duplicate_oracles,
        };

        Ok(Self {
            bound_labels: BoundLabels::new(min_key, max_key),
            default_bounds: Bounds::new(min, max),
            commit_timeout,
            duplicate_oracles,
        })
    }
}

/// Parse an optional bound; an empty value or `none` disables the bound.
fn parse_optional_i64(var: &str, raw: &str) -> DomainResult<Option<i64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    raw.parse::<i64>()
        .map(Some)
        .map_err(|e| DomainError::validation(format!("{var}: {e}")))
}
